//! Dispatch chain tests: inherited methods, overrides, shared subgraphs,
//! and recursive calls.
//!
//! The resolver hands `note_call` the full dispatch chain, first the name
//! the call was made through, last the implementation that owns the body.
//! These tests check that taint crosses every hop of such chains and that
//! the shared-subgraph model stays conservative.

use weir_analysis::{CallArg, TaintSession};
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

/// A grandchild inherits `loadFull` from the grandparent, whose body calls
/// `loadPartial` through the grandparent's declaration while the child owns
/// the override. Taint must cross both dispatch hops in each direction of
/// the hierarchy.
#[test]
fn test_taint_crosses_inherited_and_overridden_dispatch() {
    let session = make_session(FindingPolicy::FailFast);

    // $c->foo($_GET["user_id"]);
    let source = session.note_source_read("$_GET", loc(20, 15));
    session.note_call(
        &["C::foo"],
        &[CallArg::new(Some(source), loc(20, 10))],
        loc(20, 5),
    );

    // C::foo($user_id) { (new AGrandChild())->loadFull($user_id); }
    session.enter_body("C::foo");
    let param = session.param_node("C::foo", 1, loc(15, 25));
    session.note_call(
        &["AGrandChild::loadFull", "A::loadFull"],
        &[CallArg::new(Some(param), loc(17, 20))],
        loc(17, 9),
    );
    session.exit_body();

    // A::loadFull($sink) { $this->loadPartial($sink); }
    session.enter_body("A::loadFull");
    let param = session.param_node("A::loadFull", 1, loc(3, 30));
    session.note_call(
        &["A::loadPartial", "AChild::loadPartial"],
        &[CallArg::new(Some(param), loc(4, 28))],
        loc(4, 9),
    );
    session.exit_body();

    // A::loadPartial($sink) {}
    session.enter_body("A::loadPartial");
    session.param_node("A::loadPartial", 1, loc(6, 33));
    session.exit_body();

    // AChild::loadPartial($sink) { $pdo->exec("... " . $sink); }
    session.enter_body("AChild::loadPartial");
    let param = session.param_node("AChild::loadPartial", 1, loc(9, 35));
    let query = session.note_concat(loc(10, 30), &[None, Some(param)]);
    session.note_call(
        &["PDO::exec"],
        &[CallArg::new(Some(query), loc(10, 30))],
        loc(10, 15),
    );
    session.exit_body();

    let error = session.check().unwrap_err();
    let TaintError::TaintedInput(finding) = error else {
        panic!("expected a tainted-input error");
    };
    assert_eq!(
        path_labels(&finding),
        [
            "$_GET",
            "C::foo#1",
            "AGrandChild::loadFull#1",
            "A::loadFull#1",
            "A::loadPartial#1",
            "AChild::loadPartial#1",
            "concat",
            "PDO::exec#1",
        ]
    );
}

/// A shared (non-specialized) routine has one parameter and return subgraph
/// for every call site, so a tainted argument at one site contaminates the
/// result at another. Conservative, and deliberate.
#[test]
fn test_shared_subgraph_contaminates_across_call_sites() {
    let session = make_session(FindingPolicy::FailFast);

    session.enter_body("wrap");
    let param = session.param_node("wrap", 1, loc(1, 15));
    session.note_return("wrap", Some(param), loc(1, 22));
    session.exit_body();

    let source = session.note_source_read("$_GET", loc(3, 12));
    let _hot = session.note_call(
        &["wrap"],
        &[CallArg::new(Some(source), loc(3, 10))],
        loc(3, 6),
    );
    let cold = session.note_call(&["wrap"], &[CallArg::new(None, loc(4, 10))], loc(4, 6));
    session.note_sink_use("echo", 1, Some(cold), loc(5, 6));

    assert!(matches!(
        session.check(),
        Err(TaintError::TaintedInput(_))
    ));
}

/// Self-recursion produces cycles in the flow graph; the search must still
/// terminate and report the path through the parameter.
#[test]
fn test_recursive_routine_terminates_and_reports() {
    let session = make_session(FindingPolicy::FailFast);

    let source = session.note_source_read("$_GET", loc(5, 12));
    let result = session.note_call(
        &["r"],
        &[CallArg::new(Some(source), loc(5, 10))],
        loc(5, 6),
    );
    session.note_sink_use("echo", 1, Some(result), loc(6, 6));

    // r($x) { if (...) { return r($x); } return $x; }
    session.enter_body("r");
    let param = session.param_node("r", 1, loc(1, 12));
    let inner = session.note_call(&["r"], &[CallArg::new(Some(param), loc(2, 22))], loc(2, 20));
    session.note_return("r", Some(inner), loc(2, 13));
    session.note_return("r", Some(param), loc(3, 5));
    session.exit_body();

    let error = session.check().unwrap_err();
    let TaintError::TaintedInput(finding) = error else {
        panic!("expected a tainted-input error");
    };
    assert_eq!(path_labels(&finding), ["$_GET", "r#1", "r", "echo#1"]);
}

/// The same program recorded body-first and call-first reports the same
/// finding: same category, same sink, same hops. Node locations pin to
/// whichever event recorded them first, so only labels are compared.
#[test]
fn test_visit_order_does_not_change_the_finding() {
    let call_first = make_session(FindingPolicy::FailFast);
    let source = call_first.note_source_read("$_GET", loc(3, 12));
    let result = call_first.note_call(
        &["g"],
        &[CallArg::new(Some(source), loc(3, 10))],
        loc(3, 6),
    );
    call_first.note_sink_use("echo", 1, Some(result), loc(4, 6));
    call_first.enter_body("g");
    let param = call_first.param_node("g", 1, loc(1, 12));
    call_first.note_return("g", Some(param), loc(1, 20));
    call_first.exit_body();

    let body_first = make_session(FindingPolicy::FailFast);
    body_first.enter_body("g");
    let param = body_first.param_node("g", 1, loc(1, 12));
    body_first.note_return("g", Some(param), loc(1, 20));
    body_first.exit_body();
    let source = body_first.note_source_read("$_GET", loc(3, 12));
    let result = body_first.note_call(
        &["g"],
        &[CallArg::new(Some(source), loc(3, 10))],
        loc(3, 6),
    );
    body_first.note_sink_use("echo", 1, Some(result), loc(4, 6));

    let findings = [call_first, body_first].map(|session| {
        match session.check() {
            Err(TaintError::TaintedInput(finding)) => finding,
            other => panic!("expected a tainted-input error, got {other:?}"),
        }
    });
    assert_eq!(findings[0].category, findings[1].category);
    assert_eq!(findings[0].sink_location, findings[1].sink_location);
    assert_eq!(path_labels(&findings[0]), path_labels(&findings[1]));
}

/// Widening a routine's known arity across call sites: the second call
/// passes more arguments than the first, and pass-through wiring at seal
/// covers the widest position seen.
#[test]
fn test_passthrough_covers_widest_arity_seen() {
    let session = make_session(FindingPolicy::FailFast);
    let source = session.note_source_read("$_GET", loc(2, 18));
    session.note_call(&["fmt"], &[CallArg::new(None, loc(1, 10))], loc(1, 6));
    let widened = session.note_call(
        &["fmt"],
        &[
            CallArg::new(None, loc(2, 10)),
            CallArg::new(Some(source), loc(2, 14)),
        ],
        loc(2, 6),
    );
    session.note_sink_use("echo", 1, Some(widened), loc(3, 6));

    assert!(matches!(
        session.check(),
        Err(TaintError::TaintedInput(_))
    ));
}
