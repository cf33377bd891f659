//! Best-effort neutralization of disallowed constructs in plugin source.
//!
//! A fixed blocklist of dangerous syntactic forms is rewritten to the inert
//! marker `__denied__` before compilation. The sealed script environment is
//! the actual security boundary; this pass only keeps obviously hostile
//! source from ever reaching it, and records what it found.
//!
//! This pass never fails. Whatever the input, it produces output.

use std::sync::LazyLock;

use regex::Regex;

/// Marker substituted for every blocklisted construct. The capability set
/// binds this name to a function that raises a runtime error, so neutralized
/// call sites fail loudly instead of silently doing nothing.
pub const DENIED_MARKER: &str = "__denied__";

struct BlockedConstruct {
    /// Stable label reported in notices and logs.
    label: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

/// Disallowed constructs, grouped by form: call forms keep their argument
/// list (the marker is itself callable), identifier forms are swapped whole.
static BLOCKLIST: LazyLock<Vec<BlockedConstruct>> = LazyLock::new(|| {
    let call = |label, name: &str| BlockedConstruct {
        label,
        pattern: Regex::new(&format!(r"\b{name}\s*\(")).unwrap(),
        replacement: "__denied__(",
    };
    let ident = |label, name: &str| BlockedConstruct {
        label,
        pattern: Regex::new(&format!(r"\b{name}\b")).unwrap(),
        replacement: "__denied__",
    };
    vec![
        // Dynamic code evaluation
        call("eval", "eval"),
        call("Function", "Function"),
        // Timer scheduling
        call("setTimeout", "setTimeout"),
        call("setInterval", "setInterval"),
        // Network primitives outside the capability client
        call("fetch", "fetch"),
        ident("XMLHttpRequest", "XMLHttpRequest"),
        ident("WebSocket", "WebSocket"),
        // Dynamic module loading
        call("import", "import"),
        call("require", "require"),
        // Ambient DOM / global access
        ident("window", "window"),
        ident("document", "document"),
        ident("globalThis", "globalThis"),
        // Storage access
        ident("localStorage", "localStorage"),
        ident("sessionStorage", "sessionStorage"),
        ident("indexedDB", "indexedDB"),
    ]
});

/// One blocklist hit: which construct, how many times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizationNotice {
    pub construct: &'static str,
    pub occurrences: usize,
}

/// Sanitizer output: rewritten source plus what was neutralized.
#[derive(Debug, Clone)]
pub struct SanitizedSource {
    pub source: String,
    pub notices: Vec<SanitizationNotice>,
}

impl SanitizedSource {
    #[must_use]
    pub fn was_modified(&self) -> bool {
        !self.notices.is_empty()
    }
}

/// Rewrite every blocklisted construct in `source` to [`DENIED_MARKER`].
///
/// Total function: any input yields some output. Matching is word-boundary
/// anchored, so identifiers that merely contain a blocked name (`medieval`,
/// `windowsill`) pass through untouched.
#[must_use]
pub fn sanitize(source: &str) -> SanitizedSource {
    let mut result = source.to_string();
    let mut notices = Vec::new();

    for construct in BLOCKLIST.iter() {
        let occurrences = construct.pattern.find_iter(&result).count();
        if occurrences == 0 {
            continue;
        }
        result = construct
            .pattern
            .replace_all(&result, construct.replacement)
            .into_owned();
        notices.push(SanitizationNotice {
            construct: construct.label,
            occurrences,
        });
    }

    SanitizedSource {
        source: result,
        notices,
    }
}
