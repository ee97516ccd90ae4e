//! Equality and membership checks that fail with readable messages

use std::fmt::Debug;

use crate::error::{HarnessError, HarnessResult};

pub fn assert_true(condition: bool, message: impl FnOnce() -> String) -> HarnessResult<()> {
    if condition {
        Ok(())
    } else {
        Err(HarnessError::Assertion(message()))
    }
}

pub fn assert_equal<T>(what: &str, expected: &T, actual: &T) -> HarnessResult<()>
where
    T: PartialEq + Debug + ?Sized,
{
    assert_true(expected == actual, || {
        format!("{}: expected {:?}, got {:?}", what, expected, actual)
    })
}

pub fn assert_contains<T>(what: &str, haystack: &[T], needle: &T) -> HarnessResult<()>
where
    T: PartialEq + Debug,
{
    assert_true(haystack.contains(needle), || {
        format!("{}: {:?} does not contain {:?}", what, haystack, needle)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_equal_message() {
        assert!(assert_equal("image version", "18.04.202310010", "18.04.202310010").is_ok());
        let err = assert_equal("image version", "18.04.202310010", "18.04.202309010").unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"Assertion failed: image version: expected "18.04.202310010", got "18.04.202309010""#
        );
    }

    #[test]
    fn test_assert_contains() {
        let nics = vec!["a-nic".to_string(), "b-nic".to_string()];
        assert!(assert_contains("nics", &nics, &"b-nic".to_string()).is_ok());
        assert!(assert_contains("nics", &nics, &"c-nic".to_string()).is_err());
    }
}
