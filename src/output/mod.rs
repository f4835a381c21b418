// Terminal rendering and JSON envelopes shared by the CLI commands

use std::io::IsTerminal;

const RED: &str = "\x1b[0;31m";
const YELLOW: &str = "\x1b[1;33m";
const CYAN: &str = "\x1b[0;36m";
const MAGENTA: &str = "\x1b[0;35m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

#[derive(Clone, Copy)]
enum Stream {
    Out,
    Err,
}

/// Wrap `text` in `color` when the stream is a tty
fn paint(stream: Stream, color: &str, text: &str) -> String {
    let tty = match stream {
        Stream::Out => std::io::stdout().is_terminal(),
        Stream::Err => std::io::stderr().is_terminal(),
    };
    if tty {
        format!("{color}{text}{RESET}")
    } else {
        text.to_string()
    }
}

fn tagged(stream: Stream, color: &str, tag: &str, msg: &str) {
    let line = format!("{} {}", paint(stream, color, tag), msg);
    match stream {
        Stream::Out => println!("{line}"),
        Stream::Err => eprintln!("{line}"),
    }
}

pub fn warn(msg: &str) {
    tagged(Stream::Err, YELLOW, "[WARN]", msg);
}

pub fn error(msg: &str) {
    tagged(Stream::Err, RED, "[ERROR]", msg);
}

/// Remediation line printed under an error
pub fn hint(msg: &str) {
    tagged(Stream::Err, CYAN, "[HINT]", msg);
}

pub fn success(msg: &str) {
    tagged(Stream::Out, MAGENTA, "[OK]", msg);
}

pub fn header(msg: &str) {
    tagged(Stream::Out, BOLD, "===>", msg);
    println!();
}

/// Signatures and ids in human output
pub fn highlight(value: &str) -> String {
    paint(Stream::Out, CYAN, value)
}

/// Exit codes
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_FILE_NOT_FOUND: i32 = 4;
pub const EXIT_VALIDATION: i32 = 5;
pub const EXIT_NOT_FOUND: i32 = 6;

// ============================================================================
// Error Codes and Remediation
// ============================================================================

/// Error codes for JSON error responses
pub const E_MODEL_NOT_FOUND: &str = "E001";
pub const E_METHOD_NOT_FOUND: &str = "E002";
pub const E_NODE_NOT_FOUND: &str = "E003";
pub const E_INVALID_INPUT: &str = "E006";
pub const E_CFG_ERROR: &str = "E007";

/// Common remediation messages
pub const R_HINT_MODEL: &str = "Export the target class as a JSON class model and pass it with --model";
pub const R_HINT_LIST_METHODS: &str = "Run 'nullpath analyze' to see the signatures of the class";
pub const R_HINT_LIST_NODES: &str = "Run 'nullpath cfg --method NAME' to see node ids";

/// JSON output wrapper
#[derive(Debug, Clone, serde::Serialize)]
pub struct JsonResponse<T> {
    pub schema_version: String,
    pub execution_id: String,
    pub tool: String,
    pub timestamp: String,
    pub data: T,
}

impl<T: serde::Serialize> JsonResponse<T> {
    pub fn new(data: T) -> Self {
        let now = chrono::Utc::now();
        let exec_id = format!("{:x}-{}", now.timestamp(), std::process::id());

        JsonResponse {
            schema_version: "1.0.0".to_string(),
            execution_id: exec_id,
            tool: "nullpath".to_string(),
            timestamp: now.to_rfc3339(),
            data,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Error response format for JSON mode
#[derive(Debug, Clone, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl JsonError {
    pub fn new(category: &str, message: &str, code: &str) -> Self {
        JsonError {
            error: category.to_string(),
            message: message.to_string(),
            code: code.to_string(),
            remediation: None,
        }
    }

    pub fn with_remediation(mut self, remediation: &str) -> Self {
        self.remediation = Some(remediation.to_string());
        self
    }

    pub fn model_not_found(path: &str) -> Self {
        Self::new(
            "ModelNotFound",
            &format!("Class model not found: {}", path),
            E_MODEL_NOT_FOUND,
        )
        .with_remediation(R_HINT_MODEL)
    }

    /// Method not found error with remediation
    pub fn method_not_found(name: &str) -> Self {
        Self::new(
            "MethodNotFound",
            &format!("Method '{}' not found in the target class", name),
            E_METHOD_NOT_FOUND,
        )
        .with_remediation(R_HINT_LIST_METHODS)
    }

    pub fn node_not_found(what: &str) -> Self {
        Self::new(
            "NodeNotFound",
            &format!("No CFG node for {}", what),
            E_NODE_NOT_FOUND,
        )
        .with_remediation(R_HINT_LIST_NODES)
    }

    pub fn invalid_input(message: &str) -> Self {
        Self::new("InvalidInput", message, E_INVALID_INPUT)
    }

    pub fn cfg_error(signature: &str) -> Self {
        Self::new(
            "CfgError",
            &format!("No control flow graph could be built for '{}'", signature),
            E_CFG_ERROR,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_response() {
        let data = vec!["item1", "item2"];
        let response = JsonResponse::new(data);
        let json = response.to_json();
        assert!(json.contains("\"tool\":\"nullpath\""));
        assert!(json.contains("\"data\":[\"item1\",\"item2\"]"));
    }

    #[test]
    fn test_json_error_remediation_is_optional() {
        let plain = serde_json::to_string(&JsonError::invalid_input("bad")).unwrap();
        assert!(!plain.contains("remediation"));

        let hinted = serde_json::to_string(&JsonError::method_not_found("foo")).unwrap();
        assert!(hinted.contains("\"code\":\"E002\""));
        assert!(hinted.contains("nullpath analyze"));
    }
}
