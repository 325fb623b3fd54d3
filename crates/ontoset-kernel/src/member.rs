//! Members: the state and behavior a set carries and lends by composition.
//!
//! Every assignment of a member gets a fresh provenance [`Stamp`]. Copying a
//! member during composition keeps its stamp, so decomposition can tell a
//! member that is still the one a classifier lent from one that was
//! overridden afterwards.

use crate::error::KernelError;
use crate::runtime::Runtime;
use crate::set::SetId;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Names the composition machinery owns. Never copied by `compose`,
/// never accepted as member names.
pub const RESERVED_MEMBERS: &[&str] = &[
    "new",
    "basedOn",
    "basedOnInited",
    "augment",
    "diminish",
    "super",
    "callSuper",
    "init",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_MEMBERS.contains(&name)
}

/// Named arguments and named members.
pub type Fields = BTreeMap<String, Member>;

/// Provenance stamp of one member assignment.
pub type Stamp = u64;

type BehaviorFn = dyn Fn(&mut Runtime, SetId, &Fields) -> Result<Member, KernelError>;
type InitializerFn = dyn Fn(&mut Runtime, SetId, &Fields) -> Result<(), KernelError>;

/// Runs when a set is instantiated from, or composed with, the owning set.
/// Receives the set being initialized and the init arguments.
pub type Initializer = Rc<InitializerFn>;

/// A callable member. Receives the receiver set and named arguments.
#[derive(Clone)]
pub struct Behavior(Rc<BehaviorFn>);

impl Behavior {
    pub fn new(
        f: impl Fn(&mut Runtime, SetId, &Fields) -> Result<Member, KernelError> + 'static,
    ) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(
        &self,
        runtime: &mut Runtime,
        receiver: SetId,
        args: &Fields,
    ) -> Result<Member, KernelError> {
        (self.0)(runtime, receiver, args)
    }

    pub fn same(&self, other: &Behavior) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Behavior(..)")
    }
}

/// A member value.
#[derive(Debug, Clone)]
pub enum Member {
    /// Plain state.
    Value(Value),
    /// A reference to another set.
    Set(SetId),
    /// References to several sets.
    Sets(Vec<SetId>),
    /// Callable behavior.
    Behavior(Behavior),
}

impl Member {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Member::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_set(&self) -> Option<SetId> {
        match self {
            Member::Set(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_behavior(&self) -> Option<&Behavior> {
        match self {
            Member::Behavior(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_behavior(&self) -> bool {
        matches!(self, Member::Behavior(_))
    }

    /// Equality for query filters: values by content, references by id,
    /// behaviors by identity.
    pub fn matches_value(&self, value: &Value) -> bool {
        match self {
            Member::Value(v) => v == value,
            Member::Set(id) => value.as_u64() == Some(id.0),
            Member::Sets(_) | Member::Behavior(_) => false,
        }
    }

    /// A JSON rendering for reports. Behaviors render as `"<behavior>"`.
    pub fn to_json(&self) -> Value {
        match self {
            Member::Value(v) => v.clone(),
            Member::Set(id) => Value::from(id.0),
            Member::Sets(ids) => Value::Array(ids.iter().map(|id| Value::from(id.0)).collect()),
            Member::Behavior(_) => Value::String("<behavior>".to_string()),
        }
    }
}

impl From<Value> for Member {
    fn from(value: Value) -> Self {
        Member::Value(value)
    }
}

impl From<&str> for Member {
    fn from(value: &str) -> Self {
        Member::Value(Value::String(value.to_string()))
    }
}

impl From<String> for Member {
    fn from(value: String) -> Self {
        Member::Value(Value::String(value))
    }
}

impl From<bool> for Member {
    fn from(value: bool) -> Self {
        Member::Value(Value::Bool(value))
    }
}

impl From<i64> for Member {
    fn from(value: i64) -> Self {
        Member::Value(Value::from(value))
    }
}

impl From<SetId> for Member {
    fn from(value: SetId) -> Self {
        Member::Set(value)
    }
}

impl From<Vec<SetId>> for Member {
    fn from(value: Vec<SetId>) -> Self {
        Member::Sets(value)
    }
}

impl From<Behavior> for Member {
    fn from(value: Behavior) -> Self {
        Member::Behavior(value)
    }
}

/// A member together with the stamp of the assignment that produced it.
#[derive(Debug, Clone)]
pub struct Slot {
    pub member: Member,
    pub stamp: Stamp,
}

/// Build [`Fields`] from `(name, member)` pairs.
pub fn fields<K, M>(pairs: impl IntoIterator<Item = (K, M)>) -> Fields
where
    K: Into<String>,
    M: Into<Member>,
{
    pairs
        .into_iter()
        .map(|(k, m)| (k.into(), m.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reserved_names() {
        assert!(is_reserved("callSuper"));
        assert!(is_reserved("init"));
        assert!(!is_reserved("name"));
    }

    #[test]
    fn member_matches_values_and_references() {
        assert!(Member::from("ana").matches_value(&json!("ana")));
        assert!(Member::Set(SetId(3)).matches_value(&json!(3)));
        assert!(!Member::Sets(vec![SetId(3)]).matches_value(&json!([3])));
    }

    #[test]
    fn fields_builder_converts() {
        let f = fields([("age", Member::from(3i64)), ("ref", Member::from(SetId(1)))]);
        assert_eq!(f["age"].as_value(), Some(&json!(3)));
        assert_eq!(f["ref"].as_set(), Some(SetId(1)));
    }
}
