//! Unit tests for the guest Value enum

use core_types::{TypeInfo, Value};

#[cfg(test)]
mod value_creation_tests {
    use super::*;

    #[test]
    fn test_value_null_is_default() {
        let val = Value::default();
        assert!(val.is_null());
    }

    #[test]
    fn test_value_int_accessors() {
        let val = Value::Int(i64::MIN);
        assert_eq!(val.as_int(), Some(i64::MIN));
        assert_eq!(val.as_bool(), None);
    }

    #[test]
    fn test_value_bool_accessors() {
        let val = Value::Bool(false);
        assert_eq!(val.as_bool(), Some(false));
        assert_eq!(val.as_int(), None);
    }
}

#[cfg(test)]
mod value_semantics_tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_values_are_hashable_keys() {
        let mut set = HashSet::new();
        set.insert(Value::Int(1));
        set.insert(Value::Int(1));
        set.insert(Value::Bool(true));
        set.insert(Value::Null);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_value_type_tags() {
        assert_eq!(Value::Int(0).type_info(), TypeInfo::Int);
        assert_eq!(Value::Bool(true).type_info(), TypeInfo::Bool);
        assert_eq!(Value::Null.type_info(), TypeInfo::Null);
    }

    #[test]
    fn test_value_serde_representation() {
        let json = serde_json::to_string(&Value::Int(3)).unwrap();
        assert_eq!(json, r#"{"Int":3}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Int(3));
    }
}
