//! Built-in source, sink, and sanitizer tables.
//!
//! These cover the PHP surface the original analyzer ships with; project
//! overlays and declaration annotations extend them at session build time.

use crate::categories::TaintCategory;

/// Untrusted-input containers. All inject the full built-in category set.
pub(crate) const BUILTIN_SOURCES: &[&str] = &[
    "$_GET",
    "$_POST",
    "$_COOKIE",
    "$_REQUEST",
    "$_SERVER",
    "$_FILES",
];

/// Dangerous calls: (routine, 1-based parameter, sensitive category).
pub(crate) fn builtin_sinks() -> Vec<(&'static str, u32, TaintCategory)> {
    vec![
        ("PDO::exec", 1, TaintCategory::Sql),
        ("PDO::query", 1, TaintCategory::Sql),
        ("mysqli::query", 1, TaintCategory::Sql),
        ("mysqli_query", 2, TaintCategory::Sql),
        ("pg_query", 2, TaintCategory::Sql),
        ("exec", 1, TaintCategory::Shell),
        ("shell_exec", 1, TaintCategory::Shell),
        ("system", 1, TaintCategory::Shell),
        ("passthru", 1, TaintCategory::Shell),
        ("popen", 1, TaintCategory::Shell),
        ("proc_open", 1, TaintCategory::Shell),
        ("eval", 1, TaintCategory::Eval),
        ("create_function", 2, TaintCategory::Eval),
        ("include", 1, TaintCategory::FileInclude),
        ("include_once", 1, TaintCategory::FileInclude),
        ("require", 1, TaintCategory::FileInclude),
        ("require_once", 1, TaintCategory::FileInclude),
        ("echo", 1, TaintCategory::Html),
        ("print", 1, TaintCategory::Html),
        ("printf", 1, TaintCategory::Html),
        ("header", 1, TaintCategory::Header),
        ("unserialize", 1, TaintCategory::Unserialize),
    ]
}

/// Routines that strip categories from their result.
pub(crate) fn builtin_sanitizers() -> Vec<(&'static str, TaintCategory)> {
    vec![
        ("htmlentities", TaintCategory::Html),
        ("htmlspecialchars", TaintCategory::Html),
    ]
}

/// Core helpers analyzed per call site even without an annotation, so one
/// tainted use does not contaminate unrelated uses.
pub(crate) const BUILTIN_SPECIALIZED: &[&str] = &["print_r"];
