//! 输入校验工具

use crate::errors::{ChatError, ChatResult};

/// 字符串非空白校验
pub fn not_empty(value: &str, what: &str) -> ChatResult<()> {
    if value.trim().is_empty() {
        return Err(ChatError::validation(format!("{what} is empty")));
    }
    Ok(())
}

/// 非空集合校验
pub fn not_empty_list<T>(values: &[T], what: &str) -> ChatResult<()> {
    if values.is_empty() {
        return Err(ChatError::validation(format!("{what} is empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_strings() {
        assert!(not_empty("", "id").is_err());
        assert!(not_empty("   ", "id").is_err());
        assert!(not_empty("u1", "id").is_ok());
    }

    #[test]
    fn rejects_empty_lists() {
        assert!(not_empty_list::<String>(&[], "participants").is_err());
        assert!(not_empty_list(&["a"], "participants").is_ok());
    }
}
