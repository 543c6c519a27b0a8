//! Compilation request pipeline.
//!
//! A request flows through three pieces:
//!
//! - [`workspace`] writes the submitted source to a single-use temporary file,
//! - [`toolchain`] runs the external compiler against that file under a time bound,
//! - [`orchestrator`] sequences both and classifies the result into a [`CompileResponse`].

use serde::{Deserialize, Serialize};

pub mod metrics;
pub mod orchestrator;
pub mod toolchain;
pub mod workspace;

pub use orchestrator::{Orchestrator, Outcome};
pub use toolchain::{Invocation, ProcessToolchain, Toolchain};
pub use workspace::{TempWorkspaces, Workspace, WorkspaceGuard, WorkspaceManager};

/// Compiler mode requested by the client.
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Tokens,
    Ast,
    Bytecode,
    #[default]
    Run,
}

impl Action {
    /// Parses a client-supplied mode. Anything unrecognized runs the program.
    pub fn parse(value: &str) -> Self {
        match value {
            "tokens" => Action::Tokens,
            "ast" => Action::Ast,
            "bytecode" => Action::Bytecode,
            _ => Action::Run,
        }
    }

    /// Command-line flag selecting this mode, if any.
    pub fn flag(&self) -> Option<&'static str> {
        match self {
            Action::Tokens => Some("-t"),
            Action::Ast => Some("-p"),
            Action::Bytecode => Some("-b"),
            Action::Run => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Tokens => "tokens",
            Action::Ast => "ast",
            Action::Bytecode => "bytecode",
            Action::Run => "run",
        }
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Non-string values, `null` included, select the default mode.
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(value) => Ok(Action::parse(&value)),
            _ => Ok(Action::Run),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single compile submission. Owns no external resources.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct CompileRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub action: Action,
}

impl CompileRequest {
    pub fn new(code: impl Into<String>, action: Action) -> Self {
        Self {
            code: code.into(),
            action,
        }
    }
}

/// Wire response of `POST /compile`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompileResponse {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_flags() {
        let cases = [
            ("tokens", Action::Tokens, Some("-t")),
            ("ast", Action::Ast, Some("-p")),
            ("bytecode", Action::Bytecode, Some("-b")),
            ("run", Action::Run, None),
            ("garbage", Action::Run, None),
            ("", Action::Run, None),
            ("TOKENS", Action::Run, None),
        ];

        for (input, action, flag) in cases {
            let parsed = Action::parse(input);
            assert_eq!(action, parsed, "parsing {input:?}");
            assert_eq!(flag, parsed.flag(), "flag for {input:?}");
        }
    }

    #[test]
    fn test_request_defaults() {
        let req: CompileRequest = serde_json::from_str(r#"{"code": "print(1)"}"#).unwrap();
        assert_eq!(CompileRequest::new("print(1)", Action::Run), req);

        let req: CompileRequest = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!("", req.code);
        assert_eq!(Action::Run, req.action);

        let req: CompileRequest =
            serde_json::from_str(r#"{"code": "x", "action": "nonsense"}"#).unwrap();
        assert_eq!(Action::Run, req.action);

        let req: CompileRequest =
            serde_json::from_str(r#"{"code": "x", "action": "bytecode"}"#).unwrap();
        assert_eq!(Action::Bytecode, req.action);
    }

    #[test]
    fn test_request_rejects_non_string_code() {
        assert!(serde_json::from_str::<CompileRequest>(r#"{"code": 42}"#).is_err());
        assert!(serde_json::from_str::<CompileRequest>(r#"{"code": null}"#).is_err());
    }

    #[test]
    fn test_non_string_action_runs() {
        for action in ["null", "5", "false", "[\"ast\"]", "{\"mode\": \"ast\"}"] {
            let body = format!(r#"{{"code": "print(1)", "action": {action}}}"#);
            let req: CompileRequest = serde_json::from_str(&body).unwrap();
            assert_eq!(CompileRequest::new("print(1)", Action::Run), req, "{action}");
        }
    }

    #[test]
    fn test_response_serialization() {
        let ok = serde_json::to_string(&CompileResponse::ok("1\n")).unwrap();
        assert_eq!(r#"{"success":true,"output":"1\n"}"#, ok);

        let err = serde_json::to_string(&CompileResponse::err("No code provided")).unwrap();
        assert_eq!(r#"{"success":false,"error":"No code provided"}"#, err);
    }
}
