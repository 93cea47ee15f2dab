//! Test Database Module
//!
//! Everything needed to exercise the scanner without a camera, a decoder
//! library or a check-in server.
//!
//! # Features
//!
//! - **Mock Platform**: camera enumeration and stream acquisition with
//!   live-stream accounting and a gate that holds acquisition pending
//! - **Scripted Decoder**: a fake engine whose results are pushed by the test
//! - **Recording Submitter**: scripted server verdicts plus a call log
//! - **Scenarios**: ready-made lifecycle scripts with expected outcomes
//! - **Runner**: executes scenarios and checks the lifecycle invariants
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use checkin_scanner::testdb::{RunnerConfig, ScenarioRunner};
//!
//! let mut runner = ScenarioRunner::with_config(RunnerConfig {
//!     verbose: true,
//!     ..Default::default()
//! });
//! let summary = runner.run_by_names(&["accepted_check_in", "close_during_acquisition"]);
//! println!("Passed: {}/{}", summary.passed, summary.total);
//! ```

pub mod mock_camera;
pub mod mock_checkin;
pub mod mock_decoder;
pub mod runner;
pub mod scenarios;

pub use mock_camera::{
    MockCameraConfig, MockCameraPlatform, MockStream, MockVideoSink, PlatformError, PlatformStats,
    SinkProbe,
};
pub use mock_checkin::{RecordingSubmitter, ScriptedOutcome};
pub use mock_decoder::{DecoderProbe, ScriptedDecoder, ScriptedDecoderProvider};
pub use runner::{Observed, RunnerConfig, ScenarioResult, ScenarioRunner, TestSummary};
pub use scenarios::{ExpectedResults, ScanScenario, ScenarioLibrary, ScenarioStep};

/// Run every scenario with verbose output
pub fn run_all_scenarios() -> TestSummary {
    let mut runner = ScenarioRunner::with_config(RunnerConfig {
        verbose: true,
        ..Default::default()
    });
    runner.run_all()
}

/// Names of all available scenarios
pub fn list_scenario_names() -> Vec<String> {
    ScenarioLibrary::all_scenarios()
        .into_iter()
        .map(|s| s.name)
        .collect()
}

/// All tags in use, sorted
pub fn list_tags() -> Vec<String> {
    let mut tags: Vec<String> = ScenarioLibrary::all_scenarios()
        .into_iter()
        .flat_map(|s| s.tags)
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

/// Print available scenarios grouped by their first tag
pub fn print_available_scenarios() {
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                    AVAILABLE SCENARIOS                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let scenarios = ScenarioLibrary::all_scenarios();
    let mut by_category: std::collections::BTreeMap<String, Vec<&ScanScenario>> =
        std::collections::BTreeMap::new();

    for scenario in &scenarios {
        let category = scenario
            .tags
            .first()
            .cloned()
            .unwrap_or_else(|| "other".to_string());
        by_category.entry(category).or_default().push(scenario);
    }

    for (category, scenarios) in &by_category {
        println!("📁 {}", category.to_uppercase());
        for scenario in scenarios {
            println!("   • {} - {}", scenario.name, scenario.description);
        }
        println!();
    }

    println!("Total: {} scenarios available\n", scenarios.len());
}
