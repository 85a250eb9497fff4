// tests/unit_pipeline.rs
//! End-to-end pipeline runs over a synthetic build tree, including the
//! determinism guarantees: identical inputs produce byte-identical exports
//! under any thread count.

use std::fs;
use std::path::{Path, PathBuf};

use buildscope::compiledb::CompileDbEntry;
use buildscope::config::Config;
use buildscope::export;
use buildscope::pipeline::{AnalyzeInputs, Analyzer};
use buildscope::snapshot::Snapshot;

struct Fixture {
    _dir: tempfile::TempDir,
    build_dir: PathBuf,
    compile_db: Vec<CompileDbEntry>,
    scanner_output: String,
}

/// Three TUs over five headers, with real header files on disk so the
/// pipeline resolves direct includes (precise mode) including a cycle
/// between util.h and log.h.
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("README.md"), "fixture project").unwrap();
    let build_dir = root.join("build");
    fs::create_dir_all(&build_dir).unwrap();

    let inc = root.join("inc");
    fs::create_dir_all(&inc).unwrap();
    fs::write(inc.join("core.h"), "#pragma once\n").unwrap();
    fs::write(inc.join("util.h"), "#include \"core.h\"\n#include \"log.h\"\n").unwrap();
    fs::write(inc.join("log.h"), "#include \"util.h\"\n").unwrap();
    fs::write(inc.join("app.h"), "#include \"util.h\"\n").unwrap();
    fs::write(inc.join("lone.h"), "#pragma once\n").unwrap();

    let sources = ["a.cpp", "b.cpp", "c.cpp"];
    let compile_db: Vec<CompileDbEntry> = sources
        .iter()
        .map(|name| CompileDbEntry {
            file: PathBuf::from(format!("../{name}")),
            directory: build_dir.clone(),
            arguments: vec!["g++".into(), "-c".into(), format!("../{name}")],
        })
        .collect();

    let scanner_output = "\
../a.cpp.o: ../a.cpp ../inc/app.h ../inc/util.h ../inc/core.h ../inc/log.h\n\
../b.cpp.o: ../b.cpp ../inc/util.h ../inc/core.h ../inc/log.h\n\
../c.cpp.o: ../c.cpp ../inc/lone.h\n"
        .to_string();

    Fixture {
        _dir: dir,
        build_dir,
        compile_db,
        scanner_output,
    }
}

fn analyze(fixture: &Fixture, config: Config) -> Snapshot {
    let inputs = AnalyzeInputs {
        build_dir: &fixture.build_dir,
        compile_db: &fixture.compile_db,
        scanner_output: &fixture.scanner_output,
        build_ninja: "rule cxx\n",
        direct_includes: None,
        project_root: None,
    };
    Analyzer::new(config)
        .unwrap()
        .analyze(&inputs, None, None, None)
        .unwrap()
}

#[test]
fn precise_mode_with_cycle_detected() {
    let fixture = fixture();
    let snapshot = analyze(&fixture, Config::new());
    assert!(snapshot.precise, "header files on disk enable precise mode");
    assert_eq!(snapshot.tu_count(), 3);
    assert_eq!(snapshot.analysis.cycles.len(), 1);
    assert_eq!(
        snapshot.analysis.cycles[0],
        vec![PathBuf::from("inc/log.h"), PathBuf::from("inc/util.h")]
    );
    assert_eq!(snapshot.analysis.feedback_edges.len(), 1);
}

#[test]
fn empty_compile_db_yields_empty_graph() {
    let fixture = fixture();
    let inputs = AnalyzeInputs {
        build_dir: &fixture.build_dir,
        compile_db: &[],
        scanner_output: "",
        build_ninja: "",
        direct_includes: None,
        project_root: None,
    };
    let snapshot = Analyzer::new(Config::new())
        .unwrap()
        .analyze(&inputs, None, None, None)
        .unwrap();
    assert_eq!(snapshot.graph.node_count(), 0);
    assert_eq!(snapshot.analysis.stats.node_count, 0);
    assert!((snapshot.analysis.stats.sparsity - 0.0).abs() < f64::EPSILON);
}

#[test]
fn exports_are_byte_identical_across_thread_counts() {
    let fixture = fixture();

    let run_with_threads = |threads: usize| -> (String, String) {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap();
        pool.install(|| {
            let snapshot = analyze(&fixture, Config::new());
            (
                export::to_csv(&snapshot),
                export::to_json(&snapshot).unwrap(),
            )
        })
    };

    let (csv_single, json_single) = run_with_threads(1);
    let (csv_many, json_many) = run_with_threads(4);
    assert_eq!(csv_single, csv_many, "CSV must not depend on thread count");

    // created_at differs between runs; compare everything else.
    let strip = |json: &str| -> String {
        json.lines()
            .filter(|line| !line.trim_start().starts_with("\"created_at\""))
            .collect::<Vec<_>>()
            .join("\n")
    };
    assert_eq!(strip(&json_single), strip(&json_many));
}

#[test]
fn filters_narrow_the_graph_but_not_the_tus() {
    let fixture = fixture();
    let mut config = Config::new();
    config.filter = buildscope::paths::FilterSpec::new(Vec::new(), vec!["inc/lone.h".into()]);
    let snapshot = analyze(&fixture, config);
    assert!(!snapshot.graph.contains_node(Path::new("inc/lone.h")));
    // The TU that included it still exists with its full inclusion set.
    assert_eq!(snapshot.tu_count(), 3);
    assert!(snapshot.source_to_deps[Path::new("c.cpp")]
        .contains(Path::new("inc/lone.h")));
}

#[test]
fn diagnostics_count_bad_rules_and_missing_tus() {
    let fixture = fixture();
    let inputs = AnalyzeInputs {
        build_dir: &fixture.build_dir,
        compile_db: &fixture.compile_db,
        scanner_output: "garbage line with no colon target\n../a.cpp.o: ../a.cpp ../inc/app.h\n",
        build_ninja: "",
        direct_includes: None,
        project_root: None,
    };
    let snapshot = Analyzer::new(Config::new())
        .unwrap()
        .analyze(&inputs, None, None, None)
        .unwrap();
    assert_eq!(snapshot.diagnostics.parse_errors, 1);
    // b.cpp and c.cpp had no scanner rule but stay as empty TUs.
    assert_eq!(snapshot.diagnostics.missing_rules, 2);
    assert_eq!(snapshot.tu_count(), 3);
}
