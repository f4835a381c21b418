//! End-to-end analysis scenarios over small hand-built classes
//!
//! Each test builds a class model, runs the analyzer to completion and checks
//! the queries the test generator relies on.

use nullpath_analyzer::analysis::{AnalysisPhase, Analyzer};
use nullpath_analyzer::config::AnalysisConfig;
use nullpath_analyzer::model::build::*;
use nullpath_analyzer::model::{BinaryOp, ClassModel, Literal, TypeRef, Visibility};
use nullpath_analyzer::nullability::FieldNullability;
use nullpath_analyzer::registry::DEFAULT_BASELINE;

const CLASS: &str = "pkg.Account";

fn obj() -> TypeRef {
    TypeRef::object("pkg.Owner")
}

fn use_of(receiver: nullpath_analyzer::model::Expr) -> nullpath_analyzer::model::Expr {
    call_on(receiver, "notifyChange()", TypeRef::Void)
}

fn run(model: ClassModel) -> Analyzer {
    let mut analyzer = Analyzer::new(model, AnalysisConfig::default());
    analyzer.run();
    assert_eq!(analyzer.phase(), AnalysisPhase::Done);
    analyzer
}

/// `Account() { this.owner = null; }` and `touch() { owner.notifyChange(); }`
fn null_field_class() -> ClassModel {
    class(CLASS)
        .field("owner", obj())
        .executable(
            constructor(Visibility::Public)
                .body(vec![assign(2, field_of(this_ref(CLASS), "owner", obj()), null())])
                .build(),
        )
        .executable(
            method("touch", Visibility::Public)
                .body(vec![expr_stmt(5, use_of(field_ref("owner", obj())))])
                .build(),
        )
        .build()
}

#[test]
fn test_null_field_makes_dereference_a_target() {
    let analyzer = run(null_field_class());
    let touch = "pkg.Account.touch()";

    assert_eq!(analyzer.field_nullability("owner"), FieldNullability::PossiblyNull);

    let sites = analyzer.candidate_sites(touch);
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].line, 5);
    assert!(sites[0].path_count >= 1);

    assert!(analyzer.score(touch) > DEFAULT_BASELINE);
    let targets: Vec<String> = analyzer.target_methods().iter().map(|s| s.to_string()).collect();
    assert_eq!(targets, vec![touch.to_string()]);
}

#[test]
fn test_initialized_field_excludes_dereference() {
    let model = class(CLASS)
        .field("owner", obj())
        .executable(
            constructor(Visibility::Public)
                .body(vec![assign(
                    2,
                    field_of(this_ref(CLASS), "owner", obj()),
                    new_object("pkg.Owner", vec![]),
                )])
                .build(),
        )
        .executable(
            method("touch", Visibility::Public)
                .body(vec![expr_stmt(5, use_of(field_ref("owner", obj())))])
                .build(),
        )
        .build();
    let analyzer = run(model);

    assert_eq!(analyzer.field_nullability("owner"), FieldNullability::ProvablyNonNull);
    assert!(analyzer.candidate_sites("pkg.Account.touch()").is_empty());
    assert_eq!(analyzer.score("pkg.Account.touch()"), DEFAULT_BASELINE);
    assert!(analyzer.target_methods().is_empty());
}

#[test]
fn test_null_returning_helper_flows_into_caller() {
    // private Owner lookup() { return null; }
    // private Owner fresh() { return new Owner(); }
    // public void risky() { Owner y = lookup(); y.notifyChange(); }
    // public void safe() { Owner z = fresh(); z.notifyChange(); }
    let model = class(CLASS)
        .executable(
            method("lookup", Visibility::Private)
                .returns(obj())
                .body(vec![ret(2, Some(null()))])
                .build(),
        )
        .executable(
            method("fresh", Visibility::Private)
                .returns(obj())
                .body(vec![ret(4, Some(new_object("pkg.Owner", vec![])))])
                .build(),
        )
        .executable(
            method("risky", Visibility::Public)
                .body(vec![
                    local_decl(6, "y", obj(), Some(call_self("lookup()", vec![], obj()))),
                    expr_stmt(7, use_of(local_ref("y", obj()))),
                ])
                .build(),
        )
        .executable(
            method("safe", Visibility::Public)
                .body(vec![
                    local_decl(9, "z", obj(), Some(call_self("fresh()", vec![], obj()))),
                    expr_stmt(10, use_of(local_ref("z", obj()))),
                ])
                .build(),
        )
        .build();
    let analyzer = run(model);

    assert!(analyzer.is_return_nullable("pkg.Account.lookup()"));
    assert!(!analyzer.is_return_nullable("pkg.Account.fresh()"));
    assert!(analyzer.is_return_nullable("pkg.Account.nowhere()"));

    let risky = analyzer.candidate_sites("pkg.Account.risky()");
    assert_eq!(risky.iter().map(|s| s.line).collect::<Vec<_>>(), vec![7]);
    assert!(analyzer.candidate_sites("pkg.Account.safe()").is_empty());

    let targets: Vec<String> = analyzer.target_methods().iter().map(|s| s.to_string()).collect();
    assert_eq!(targets, vec!["pkg.Account.risky()".to_string()]);
}

#[test]
fn test_private_methods_are_never_targets() {
    let model = class(CLASS)
        .executable(
            method("hidden", Visibility::Private)
                .param("o", obj())
                .body(vec![expr_stmt(3, use_of(param_ref("o", obj())))])
                .build(),
        )
        .build();
    let analyzer = run(model);
    assert_eq!(analyzer.candidate_sites("hidden").len(), 1);
    assert!(analyzer.target_methods().is_empty());
}

#[test]
fn test_independent_runs_agree() {
    let first = run(null_field_class());
    let second = run(null_field_class());

    assert_eq!(first.target_methods(), second.target_methods());
    for sig in ["pkg.Account.touch()", "pkg.Account()"] {
        assert_eq!(first.score(sig), second.score(sig), "score of {}", sig);
    }
    assert_eq!(
        serde_json::to_value(first.report()).unwrap(),
        serde_json::to_value(second.report()).unwrap()
    );
}

#[test]
fn test_rescoring_after_feedback_is_stable() {
    let mut analyzer = run(null_field_class());
    analyzer.record_discovered_npe(5);
    let once = serde_json::to_value(analyzer.report()).unwrap();
    analyzer.record_discovered_npe(5);
    assert_eq!(serde_json::to_value(analyzer.report()).unwrap(), once);
}

/// `fill` passes null as the second argument of `put`, either to another
/// map or to this class's own `put(Object k, Object v)`
fn cache_class(foreign_receiver: bool) -> ClassModel {
    let object = TypeRef::object("java.lang.Object");
    let map = TypeRef::object("java.util.Map");
    let receiver = foreign_receiver.then(|| param_ref("other", map.clone()));
    class("pkg.Cache")
        .executable(
            method("fill", Visibility::Public)
                .param("other", map)
                .body(vec![expr_stmt(
                    2,
                    call(
                        receiver,
                        "put(java.lang.Object,java.lang.Object)",
                        vec![str_lit("k"), null()],
                        object.clone(),
                    ),
                )])
                .build(),
        )
        .executable(
            method("put", Visibility::Private)
                .param("k", object.clone())
                .param("v", object.clone())
                .returns(object.clone())
                .body(vec![
                    expr_stmt(5, call_on(param_ref("v", object.clone()), "hashCode()", TypeRef::int())),
                    ret(6, Some(param_ref("k", object))),
                ])
                .build(),
        )
        .build()
}

#[test]
fn test_null_argument_flags_only_own_callee() {
    let put = "pkg.Cache.put(java.lang.Object,java.lang.Object)";
    let flagged = |foreign: bool| {
        let analyzer = run(cache_class(foreign));
        analyzer.context().methods().get(put).unwrap().nullable_params.clone()
    };

    assert!(flagged(true).is_empty(), "Map.put must not flag the class's own put");
    assert_eq!(flagged(false).into_iter().collect::<Vec<_>>(), vec!["v".to_string()]);
}

#[test]
fn test_discovered_npe_drops_score_to_baseline() {
    let mut analyzer = run(null_field_class());
    let touch = "pkg.Account.touch()";
    assert!(analyzer.score(touch) > DEFAULT_BASELINE);

    analyzer.record_discovered_npe(5);
    assert_eq!(analyzer.score(touch), DEFAULT_BASELINE);
    assert_eq!(analyzer.report().found_npe_lines, vec![5]);

    // Lines without sites change nothing
    analyzer.record_discovered_npe(99);
    assert_eq!(analyzer.score(touch), DEFAULT_BASELINE);
}

#[test]
fn test_choose_target_is_reproducible() {
    let model = class(CLASS)
        .field("owner", obj())
        .executable(
            method("a", Visibility::Public)
                .param("o", obj())
                .body(vec![expr_stmt(2, use_of(param_ref("o", obj())))])
                .build(),
        )
        .executable(
            method("b", Visibility::Protected)
                .body(vec![
                    expr_stmt(4, use_of(field_ref("owner", obj()))),
                    if_stmt(
                        5,
                        local_ref("flag", TypeRef::boolean()),
                        vec![expr_stmt(6, use_of(field_ref("owner", obj())))],
                        None,
                    ),
                ])
                .build(),
        )
        .build();

    let draws = |seed: u64| {
        let mut analyzer = Analyzer::new(model.clone(), AnalysisConfig::default().with_seed(seed));
        analyzer.run();
        (0..20)
            .map(|_| analyzer.choose_target_method().map(|s| s.to_string()))
            .collect::<Vec<_>>()
    };

    let first = draws(7);
    assert_eq!(first, draws(7));
    assert!(first.iter().all(|s| s.is_some()));
}

#[test]
fn test_choose_without_targets_is_none() {
    let model = class(CLASS)
        .executable(method("noop", Visibility::Public).body(vec![ret(1, None)]).build())
        .build();
    let mut analyzer = run(model);
    assert!(analyzer.choose_target_method().is_none());
    assert_eq!(analyzer.score("pkg.Account.noop()"), DEFAULT_BASELINE);
}

#[test]
fn test_seed_literals_before_sites() {
    let model = class(CLASS)
        .executable(
            method("m", Visibility::Public)
                .param("o", obj())
                .body(vec![
                    local_decl(1, "limit", TypeRef::int(), Some(int_lit(7))),
                    local_decl(2, "tag", TypeRef::string(), Some(str_lit("acct"))),
                    if_stmt(
                        3,
                        binary(BinaryOp::Gt, local_ref("limit", TypeRef::int()), int_lit(42), TypeRef::boolean()),
                        vec![assign(4, local_ref("limit", TypeRef::int()), int_lit(5))],
                        None,
                    ),
                    expr_stmt(5, use_of(param_ref("o", obj()))),
                    local_decl(6, "after", TypeRef::int(), Some(int_lit(99))),
                ])
                .build(),
        )
        .build();
    let mut analyzer = run(model);
    let literals = analyzer.seed_literals("pkg.Account.m(pkg.Owner)");
    assert!(literals.contains(&Literal::Int(7)));
    assert!(literals.contains(&Literal::Str("acct".to_string())));
    assert!(literals.contains(&Literal::Int(5)));
    assert!(!literals.contains(&Literal::Int(42)), "branch conditions are not seeds");
    assert!(!literals.contains(&Literal::Int(99)));
    assert!(!literals.contains(&Literal::Null));
}

#[test]
fn test_influential_constructor_params() {
    // Account(Owner o, int n) { this.owner = o; }
    let model = class(CLASS)
        .field("owner", obj())
        .executable(
            constructor(Visibility::Public)
                .param("o", obj())
                .param("n", TypeRef::int())
                .body(vec![assign(2, field_of(this_ref(CLASS), "owner", obj()), param_ref("o", obj()))])
                .build(),
        )
        .build();
    let mut analyzer = run(model);
    assert_eq!(analyzer.choose_influential_param("pkg.Account(pkg.Owner,int)"), Some(0));
    assert_eq!(analyzer.choose_influential_param("pkg.Account.missing()"), None);
}
