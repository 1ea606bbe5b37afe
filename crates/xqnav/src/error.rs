use core::fmt;
use std::sync::Arc;

/// Error codes raised by the path engine.
///
/// Only the codes the navigational subsystem can actually produce are listed; anything
/// else surfaced by an embedding runtime is carried through `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FOER0000, // generic error, used for cooperative cancellation
    FODC0006, // document input is not well-formed XML
    FORG0006, // invalid effective boolean value
    XPDY0002, // context item absent
    XPTY0004, // generic type error
    XPTY0018, // last step mixes nodes and atomic values
    XPTY0019, // path step input is not a node
    XPTY0020, // axis step context item is not a node
    XPST0003, // syntax error
    XPST0008, // undeclared variable
    XPST0017, // unknown function or wrong arity
    XPST0081, // unbound namespace prefix
    Unknown,
}

impl ErrorCode {
    pub fn local(self) -> &'static str {
        match self {
            ErrorCode::FOER0000 => "FOER0000",
            ErrorCode::FODC0006 => "FODC0006",
            ErrorCode::FORG0006 => "FORG0006",
            ErrorCode::XPDY0002 => "XPDY0002",
            ErrorCode::XPTY0004 => "XPTY0004",
            ErrorCode::XPTY0018 => "XPTY0018",
            ErrorCode::XPTY0019 => "XPTY0019",
            ErrorCode::XPTY0020 => "XPTY0020",
            ErrorCode::XPST0003 => "XPST0003",
            ErrorCode::XPST0008 => "XPST0008",
            ErrorCode::XPST0017 => "XPST0017",
            ErrorCode::XPST0081 => "XPST0081",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }

    pub fn from_code(s: &str) -> Self {
        let local = s.strip_prefix("err:").unwrap_or(s);
        match local {
            "FOER0000" => ErrorCode::FOER0000,
            "FODC0006" => ErrorCode::FODC0006,
            "FORG0006" => ErrorCode::FORG0006,
            "XPDY0002" => ErrorCode::XPDY0002,
            "XPTY0004" => ErrorCode::XPTY0004,
            "XPTY0018" => ErrorCode::XPTY0018,
            "XPTY0019" => ErrorCode::XPTY0019,
            "XPTY0020" => ErrorCode::XPTY0020,
            "XPST0003" => ErrorCode::XPST0003,
            "XPST0008" => ErrorCode::XPST0008,
            "XPST0017" => ErrorCode::XPST0017,
            "XPST0081" => ErrorCode::XPST0081,
            _ => ErrorCode::Unknown,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            source: None,
        }
    }

    /// Compose an error with a source cause.
    pub fn with_source(
        mut self,
        source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>,
    ) -> Self {
        self.source = source.into();
        self
    }

    pub fn cancelled() -> Self {
        Self::from_code(ErrorCode::FOER0000, "evaluation cancelled")
    }

    /// Context item is absent while evaluating `what`.
    pub fn no_context(what: impl fmt::Display) -> Self {
        Self::from_code(
            ErrorCode::XPDY0002,
            format!("no context value bound for {what}"),
        )
    }

    /// Context item is present but not a node.
    pub fn context_not_node(what: impl fmt::Display, item_type: impl fmt::Display) -> Self {
        Self::from_code(
            ErrorCode::XPTY0020,
            format!("context item of {what} is not a node: {item_type}"),
        )
    }

    /// A path step (or root) produced a non-node where further navigation was required.
    pub fn path_not_node(step: impl fmt::Display, item_type: impl fmt::Display) -> Self {
        Self::from_code(
            ErrorCode::XPTY0019,
            format!("{step}: node expected, {item_type} found"),
        )
    }

    pub fn mixed_path(step: impl fmt::Display) -> Self {
        Self::from_code(
            ErrorCode::XPTY0018,
            format!("{step}: path yields both nodes and atomic values"),
        )
    }

    /// Format the code as a human-readable string (`err:LOCAL`).
    pub fn format_code(&self) -> String {
        format!("err:{}", self.code.local())
    }
}

impl From<pest::error::Error<crate::parser::Rule>> for Error {
    fn from(e: pest::error::Error<crate::parser::Rule>) -> Self {
        Error::from_code(ErrorCode::XPST0003, e.to_string())
            .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    }
}

impl From<roxmltree::Error> for Error {
    fn from(e: roxmltree::Error) -> Self {
        Error::from_code(ErrorCode::FODC0006, format!("invalid XML input: {e}"))
            .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error: {} ({})", self.message, self.format_code())
    }
}
