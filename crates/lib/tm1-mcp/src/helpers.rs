use std::borrow::Cow;

use rmcp::ErrorData;
use rmcp::model::{CallToolResult, Content, ErrorCode};
use serde::Serialize;
use serde_json::Map;
use tm1_core::control::ControlError;

pub(crate) fn mcp_err(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> ErrorData {
    ErrorData {
        code,
        message: message.into(),
        data: None,
    }
}

pub(crate) fn map_err(err: ControlError) -> ErrorData {
    let code = if err.is_not_found() {
        ErrorCode::RESOURCE_NOT_FOUND
    } else if err.is_invalid_input() {
        ErrorCode::INVALID_PARAMS
    } else {
        ErrorCode::INTERNAL_ERROR
    };
    mcp_err(code, err.to_string())
}

pub(crate) fn json_result<T: Serialize>(value: T) -> Result<CallToolResult, ErrorData> {
    Ok(CallToolResult::success(vec![Content::json(value)?]))
}

/// Renders a missing entity as `{}`.
pub(crate) fn optional_result<T: Serialize>(value: Option<T>) -> Result<CallToolResult, ErrorData> {
    match value {
        Some(value) => json_result(value),
        None => json_result(Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm1_core::session::SessionError;

    #[test]
    fn control_errors_map_to_mcp_codes() {
        let not_found = map_err(ControlError::Session(SessionError::NotFound("cube 'X'".to_string())));
        assert_eq!(not_found.code, ErrorCode::RESOURCE_NOT_FOUND);

        let invalid = map_err(ControlError::InvalidInput("mdx is required".to_string()));
        assert_eq!(invalid.code, ErrorCode::INVALID_PARAMS);
        assert!(invalid.message.contains("mdx is required"));

        let transport = map_err(ControlError::Session(SessionError::Transport("refused".to_string())));
        assert_eq!(transport.code, ErrorCode::INTERNAL_ERROR);
    }
}
