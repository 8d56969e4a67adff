//! End-to-end flow tests: hook events in, findings out.
//!
//! Each test drives `TaintSession` the way the expression walker would
//! during a real run, then checks what the path finder reports. Bodies
//! are visited in arbitrary order relative to their call sites, so
//! several tests deliberately record the call first and the body later.

use weir_analysis::{CallArg, CategorySet, TaintCategory, TaintContract, TaintSession};
use weir_core::types::SourceLocation;
use weir_core::{AnalyzerConfig, FindingPolicy, TaintError};

fn loc(line: u32, column: u32) -> SourceLocation {
    SourceLocation::new("somefile.php", line, column)
}

fn make_session(policy: FindingPolicy) -> TaintSession {
    let mut config = AnalyzerConfig::default();
    config.taint.track_tainted_input = Some(true);
    config.taint.finding_policy = Some(policy);
    TaintSession::new(&config).unwrap()
}

fn path_labels(finding: &weir_core::Finding) -> Vec<&str> {
    finding.path.iter().map(|step| step.label.as_str()).collect()
}

/// A superglobal read returned through two methods, concatenated into a
/// query, and handed to `PDO::exec` through a parameter. The rendered
/// message is the full contract: category, sink location, and every hop
/// with the location it was first recorded at.
#[test]
fn test_tainted_return_chain_renders_exact_message() {
    let session = make_session(FindingPolicy::FailFast);

    // Caller body first: both calls land before either callee body.
    let appended = session.note_call(&["A::getAppendedUserId"], &[], loc(12, 35));
    let user_id = session.note_assignment("$userId", loc(12, 25), Some(appended), None);
    session.note_call(
        &["A::deleteUser"],
        &[
            CallArg::new(None, loc(13, 41)),
            CallArg::new(Some(user_id), loc(13, 49)),
        ],
        loc(13, 27),
    );

    // A::getAppendedUserId() { return "aaaa" . $this->getUserId(); }
    session.enter_body("A::getAppendedUserId");
    let inner = session.note_call(&["A::getUserId"], &[], loc(8, 41));
    let concat = session.note_concat(loc(8, 32), &[None, Some(inner)]);
    session.note_return("A::getAppendedUserId", Some(concat), loc(8, 25));
    session.exit_body();

    // A::getUserId() { return (string) $_GET["user_id"]; }
    session.enter_body("A::getUserId");
    let source = session.note_source_read("$_GET", loc(4, 41));
    let cast = session.note_cast(Some(source), loc(4, 32));
    session.note_return("A::getUserId", Some(cast), loc(4, 25));
    session.exit_body();

    // A::deleteUser($pdo, $userId) { $pdo->exec("... id = " . $userId); }
    session.enter_body("A::deleteUser");
    let param = session.param_node("A::deleteUser", 2, loc(16, 52));
    let query = session.note_concat(loc(17, 36), &[None, Some(param)]);
    session.note_call(
        &["PDO::exec"],
        &[CallArg::new(Some(query), loc(17, 36))],
        loc(17, 22),
    );
    session.exit_body();

    let error = session.check().unwrap_err();
    let TaintError::TaintedInput(finding) = error else {
        panic!("expected a tainted-input error");
    };
    assert_eq!(
        finding.message(),
        "TaintedInput - somefile.php:17:36 - Detected tainted sql in path: \
         $_GET (somefile.php:4:41) -> A::getUserId (somefile.php:8:41) -> \
         concat (somefile.php:8:32) -> A::getAppendedUserId (somefile.php:12:35) -> \
         $userId (somefile.php:12:25) -> A::deleteUser#2 (somefile.php:13:49) -> \
         concat (somefile.php:17:36) -> PDO::exec#1 (somefile.php:17:36)"
    );
}

/// Concatenation unions its operands: a clean prefix does not dilute a
/// tainted suffix, and the path skips the clean branch.
#[test]
fn test_concat_unions_operand_taint() {
    let session = make_session(FindingPolicy::FailFast);
    let clean = session.note_assignment("$prefix", loc(2, 5), None, None);
    let tainted = session.note_source_read("$_GET", loc(3, 15));
    let joined = session.note_concat(loc(4, 12), &[Some(clean), Some(tainted)]);
    session.note_sink_use("echo", 1, Some(joined), loc(5, 8));

    let error = session.check().unwrap_err();
    let TaintError::TaintedInput(finding) = error else {
        panic!("expected a tainted-input error");
    };
    assert_eq!(finding.category, "html");
    assert_eq!(path_labels(&finding), ["$_GET", "concat", "echo#1"]);
}

/// Conditional assignment: the merge node keeps taint flowing from
/// whichever branch carried it.
#[test]
fn test_branch_join_keeps_taint_from_either_branch() {
    let session = make_session(FindingPolicy::FailFast);
    let tainted = session.note_source_read("$_POST", loc(3, 14));
    let then_arm = session.note_assignment("$v", loc(3, 9), Some(tainted), None);
    let else_arm = session.note_assignment("$v", loc(5, 9), None, None);
    let merged = session.note_join("$v", loc(6, 5), &[Some(then_arm), Some(else_arm)]);
    session.note_sink_use("echo", 1, Some(merged), loc(7, 10));

    assert!(matches!(
        session.check(),
        Err(TaintError::TaintedInput(_))
    ));
}

/// Casts are identity for taint: no hop appears in the path and nothing
/// is stripped.
#[test]
fn test_cast_is_transparent() {
    let session = make_session(FindingPolicy::FailFast);
    let source = session.note_source_read("$_GET", loc(2, 10));
    let cast = session.note_cast(Some(source), loc(2, 1));
    session.note_sink_use("echo", 1, Some(cast), loc(3, 6));

    let error = session.check().unwrap_err();
    let TaintError::TaintedInput(finding) = error else {
        panic!("expected a tainted-input error");
    };
    assert_eq!(path_labels(&finding), ["$_GET", "echo#1"]);
}

/// A routine nobody declared and whose body was never seen must not
/// swallow taint: sealing wires every argument through to the result.
#[test]
fn test_unknown_helper_is_passthrough_not_sanitizer() {
    let session = make_session(FindingPolicy::FailFast);
    let source = session.note_source_read("$_GET", loc(2, 10));
    let query = session.note_concat(loc(3, 12), &[None, Some(source)]);
    let replaced = session.note_call(
        &["str_replace"],
        &[
            CallArg::new(None, loc(4, 22)),
            CallArg::new(None, loc(4, 27)),
            CallArg::new(Some(query), loc(4, 32)),
        ],
        loc(4, 10),
    );
    session.note_call(
        &["PDO::exec"],
        &[CallArg::new(Some(replaced), loc(5, 15))],
        loc(5, 5),
    );

    let error = session.check().unwrap_err();
    let TaintError::TaintedInput(finding) = error else {
        panic!("expected a tainted-input error");
    };
    assert_eq!(finding.category, "sql");
    let labels = path_labels(&finding);
    assert!(labels.contains(&"str_replace#3"), "path: {labels:?}");
    assert!(labels.contains(&"str_replace"), "path: {labels:?}");
}

/// A declared `taint-remove` contract blocks the named category even
/// though the routine has no body, and leaves other categories intact.
#[test]
fn test_declared_removal_blocks_only_named_categories() {
    let session = make_session(FindingPolicy::Collect);
    let contract = TaintContract::from_directives(["taint-remove html"]).unwrap();
    session.declare_routine("my_escaper", &contract, &["$s"]);

    let source = session.note_source_read("$_GET", loc(2, 10));
    let escaped = session.note_call(
        &["my_escaper"],
        &[CallArg::new(Some(source), loc(3, 20))],
        loc(3, 8),
    );
    session.note_sink_use("echo", 1, Some(escaped), loc(4, 6));
    session.note_call(
        &["PDO::exec"],
        &[CallArg::new(Some(escaped), loc(5, 15))],
        loc(5, 5),
    );

    let findings = session.check().unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].category, "sql");
    assert_eq!(findings[0].sink_location, loc(5, 15));
}

/// `htmlentities` is sanitizer-declared out of the box.
#[test]
fn test_builtin_html_sanitizer_blocks_echo() {
    let session = make_session(FindingPolicy::Collect);
    let source = session.note_source_read("$_GET", loc(2, 10));
    let escaped = session.note_call(
        &["htmlentities"],
        &[CallArg::new(Some(source), loc(3, 22))],
        loc(3, 9),
    );
    session.note_sink_use("echo", 1, Some(escaped), loc(4, 6));

    assert!(session.check().unwrap().is_empty());
}

/// An inline sanitizing expression recorded by the walker strips its
/// categories from everything downstream, without touching the value it
/// derived from.
#[test]
fn test_inline_sanitizer_strips_categories() {
    let session = make_session(FindingPolicy::Collect);
    let source = session.note_source_read("$_GET", loc(2, 10));

    let mut removed = CategorySet::new();
    removed.insert(TaintCategory::Html);
    let safe = session.note_sanitizer_applied(Some(source), loc(3, 9), &removed);
    session.note_sink_use("echo", 1, Some(safe), loc(4, 6));
    session.note_call(
        &["PDO::exec"],
        &[CallArg::new(Some(safe), loc(5, 15))],
        loc(5, 5),
    );
    session.note_sink_use("echo", 1, Some(source), loc(6, 6));

    let findings = session.check().unwrap();
    assert_eq!(findings.len(), 2);
    assert_eq!(findings[0].category, "sql");
    assert_eq!(findings[0].sink_location, loc(5, 15));
    assert_eq!(findings[1].category, "html");
    assert_eq!(findings[1].sink_location, loc(6, 6));
}

/// An asserted-untainted rebinding suppresses findings downstream of the
/// assertion and nothing else.
#[test]
fn test_assert_untainted_is_downstream_only() {
    let session = make_session(FindingPolicy::Collect);
    let first = session.note_source_read("$_GET", loc(2, 8));
    let second = session.note_source_read("$_GET", loc(3, 8));

    let validated = session.note_assert_untainted("$a", loc(5, 5), Some(first), None);
    session.note_call(
        &["PDO::exec"],
        &[CallArg::new(Some(validated), loc(6, 15))],
        loc(6, 5),
    );
    session.note_call(
        &["PDO::exec"],
        &[CallArg::new(Some(second), loc(7, 15))],
        loc(7, 5),
    );

    let findings = session.check().unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].sink_location, loc(7, 15));
}

/// A routine with several `return` statements unions them at its shared
/// return node.
#[test]
fn test_multiple_returns_union_at_shared_return() {
    let session = make_session(FindingPolicy::FailFast);
    let result = session.note_call(&["f"], &[], loc(10, 9));
    session.note_sink_use("echo", 1, Some(result), loc(10, 20));

    session.enter_body("f");
    let clean = session.note_assignment("$x", loc(2, 5), None, None);
    session.note_return("f", Some(clean), loc(3, 5));
    let tainted = session.note_source_read("$_COOKIE", loc(5, 12));
    session.note_return("f", Some(tainted), loc(6, 5));
    session.exit_body();

    let error = session.check().unwrap_err();
    let TaintError::TaintedInput(finding) = error else {
        panic!("expected a tainted-input error");
    };
    assert_eq!(path_labels(&finding), ["$_COOKIE", "f", "echo#1"]);
}

/// A reassignment creates a fresh node per occurrence: taint from the
/// first binding does not leak into reads recorded against the second.
#[test]
fn test_reassignment_does_not_alias_occurrences() {
    let session = make_session(FindingPolicy::Collect);
    let tainted = session.note_source_read("$_GET", loc(2, 8));
    let _first = session.note_assignment("$x", loc(2, 5), Some(tainted), None);
    let second = session.note_assignment("$x", loc(3, 5), None, None);
    session.note_sink_use("echo", 1, Some(second), loc(4, 6));

    assert!(session.check().unwrap().is_empty());
}

/// Assignment-time removal (a filtering assignment) behaves like an
/// inline sanitizer on the stored value.
#[test]
fn test_assignment_with_removal_strips_categories() {
    let session = make_session(FindingPolicy::Collect);
    let source = session.note_source_read("$_GET", loc(2, 12));
    let mut removed = CategorySet::new();
    removed.insert(TaintCategory::Sql);
    let stored = session.note_assignment("$id", loc(2, 5), Some(source), Some(&removed));
    session.note_call(
        &["PDO::exec"],
        &[CallArg::new(Some(stored), loc(3, 15))],
        loc(3, 5),
    );
    session.note_sink_use("echo", 1, Some(stored), loc(4, 6));

    let findings = session.check().unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].category, "html");
}
