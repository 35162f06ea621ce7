//! Streaming grouped aggregation over tuples, one at a time: COUNT, SUM,
//! MIN, MAX, AVG for integer columns; COUNT only for string columns.

use common::{DbError, DbResult};
use hashbrown::HashMap;
use types::{Field, FieldType, Tuple};


/// The aggregation function an [`Aggregator`] applies within each group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggOp {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    None,
    Int(i32),
    Str(String),
}

impl GroupKey {
    fn from_field(field: &Field) -> Self {
        match field {
            Field::Int(v) => GroupKey::Int(*v),
            Field::Str(s) => GroupKey::Str(s.clone()),
        }
    }

    fn into_field(self) -> Option<Field> {
        match self {
            GroupKey::None => None,
            GroupKey::Int(v) => Some(Field::Int(v)),
            GroupKey::Str(s) => Some(Field::Str(s)),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct IntAccumulator {
    count: i64,
    sum: i64,
    min: i32,
    max: i32,
}

impl Default for IntAccumulator {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0,
            min: i32::MAX,
            max: i32::MIN,
        }
    }
}

impl IntAccumulator {
    fn merge(&mut self, v: i32) {
        self.count += 1;
        self.sum += v as i64;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
    }

    fn value(&self, op: AggOp) -> i64 {
        match op {
            AggOp::Count => self.count,
            AggOp::Sum => self.sum,
            AggOp::Min => self.min as i64,
            AggOp::Max => self.max as i64,
            AggOp::Avg => {
                if self.count == 0 {
                    0
                } else {
                    self.sum / self.count
                }
            }
        }
    }
}

enum AggState {
    Int(HashMap<GroupKey, IntAccumulator>),
    Str(HashMap<GroupKey, i64>),
}

/// Configuration: which field to group by (`None` means every tuple
/// falls into a single implicit group), which field to aggregate, and
/// which operator to apply. Validated once at construction so `merge`
/// never has to reject a bad configuration mid-stream.
pub struct Aggregator {
    group_field: Option<usize>,
    agg_field: usize,
    op: AggOp,
    state: AggState,
}

impl Aggregator {
    pub fn new(group_field: Option<usize>, agg_field: usize, agg_field_type: FieldType, op: AggOp) -> DbResult<Self> {
        let state = match agg_field_type {
            FieldType::Int32 => AggState::Int(HashMap::new()),
            FieldType::Str(_) => {
                if op != AggOp::Count {
                    return Err(DbError::InvalidArgument(format!(
                        "string aggregation supports only COUNT, got {op:?}"
                    )));
                }
                AggState::Str(HashMap::new())
            }
        };
        Ok(Self {
            group_field,
            agg_field,
            op,
            state,
        })
    }

    /// Fold one more tuple into the running aggregate(s).
    pub fn merge(&mut self, tuple: &Tuple) -> DbResult<()> {
        let key = match self.group_field {
            None => GroupKey::None,
            Some(idx) => {
                let field = tuple
                    .field(idx)
                    .ok_or_else(|| DbError::InvalidArgument(format!("tuple has no field at group index {idx}")))?;
                GroupKey::from_field(field)
            }
        };
        let value = tuple
            .field(self.agg_field)
            .ok_or_else(|| DbError::InvalidArgument(format!("tuple has no field at aggregate index {}", self.agg_field)))?;

        match (&mut self.state, value) {
            (AggState::Int(groups), Field::Int(v)) => {
                groups.entry(key).or_default().merge(*v);
                Ok(())
            }
            (AggState::Str(groups), Field::Str(_)) => {
                *groups.entry(key).or_insert(0) += 1;
                Ok(())
            }
            _ => Err(DbError::InvalidArgument("aggregated field's value does not match the configured type".into())),
        }
    }

    /// Emit `(group value, aggregate value)` pairs. The group value is
    /// `None` when this aggregator has no grouping column. Order is
    /// unspecified.
    pub fn iterator(&self) -> Box<dyn Iterator<Item = (Option<Field>, i64)> + '_> {
        match &self.state {
            AggState::Int(groups) => {
                let op = self.op;
                Box::new(groups.iter().map(move |(k, acc)| (k.clone().into_field(), acc.value(op))))
            }
            AggState::Str(groups) => Box::new(groups.iter().map(|(k, count)| (k.clone().into_field(), *count))),
        }
    }
}
