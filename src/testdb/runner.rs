//! Scenario runner
//!
//! Drives a [`ScanCoordinator`] through each scenario's steps on a fresh
//! single-threaded runtime with real (short) timers, then compares what
//! happened with the scenario's expectations and with the invariants every
//! session must keep:
//!
//! - at most one live stream at any time
//! - at most one successful check-in per session
//! - no state transition after a session reached `Closed`
//! - nothing left running once the scanner is closed

use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::mock_camera::{MockCameraPlatform, MockVideoSink};
use super::mock_checkin::RecordingSubmitter;
use super::mock_decoder::ScriptedDecoderProvider;
use super::scenarios::{ExpectedResults, ScanScenario, ScenarioLibrary, ScenarioStep};
use crate::core::error::ErrorKind;
use crate::scanner::{
    CoordinatorSettings, ScanCoordinator, ScanEvent, ScanPlatform, ScanState,
};

/// What a scenario run actually produced
#[derive(Debug, Clone, Default)]
pub struct Observed {
    pub final_state: Option<ScanState>,
    pub submissions: usize,
    pub successes: usize,
    pub failures: usize,
    pub last_error: Option<ErrorKind>,
    pub live_streams: usize,
    pub max_live_streams: usize,
    pub acquisitions: usize,
    pub selected_device: Option<String>,
    /// Streams still live after the final close
    pub leaked_streams: usize,
    pub sink_attached_after_close: bool,
    /// Transitions seen after their session reached `Closed`
    pub transitions_after_close: usize,
}

/// Result of running a single scenario
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub name: String,
    pub passed: bool,
    pub duration: Duration,
    pub observed: Observed,
    pub tags: Vec<String>,
    /// Every mismatch found, empty when passed
    pub failures: Vec<String>,
}

/// Summary of a run
#[derive(Debug, Clone, Default)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub total_duration: Duration,
    pub results: Vec<ScenarioResult>,
}

impl TestSummary {
    /// Pass rate as a percentage
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }

    pub fn failed_scenarios(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Results grouped by their first tag
    pub fn results_by_tag(&self) -> HashMap<String, Vec<&ScenarioResult>> {
        let mut grouped: HashMap<String, Vec<&ScenarioResult>> = HashMap::new();
        for result in &self.results {
            let tag = result
                .tags
                .first()
                .cloned()
                .unwrap_or_else(|| "other".to_string());
            grouped.entry(tag).or_default().push(result);
        }
        grouped
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Configuration for the runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub verbose: bool,
    /// Stop at the first failing scenario
    pub fail_fast: bool,
    pub tag_filter: Option<Vec<String>>,
    pub name_filter: Option<String>,
    /// Cool-down used by the coordinator during runs
    pub resume_delay: Duration,
    /// How long a `Settle` step waits
    pub settle: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            fail_fast: false,
            tag_filter: None,
            name_filter: None,
            resume_delay: Duration::from_millis(100),
            settle: Duration::from_millis(20),
        }
    }
}

/// Runs scan scenarios against mock collaborators
pub struct ScenarioRunner {
    config: RunnerConfig,
    results: Vec<ScenarioResult>,
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioRunner {
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            config,
            results: Vec::new(),
        }
    }

    pub fn run_all(&mut self) -> TestSummary {
        self.run_scenarios(ScenarioLibrary::all_scenarios())
    }

    pub fn run_by_tag(&mut self, tag: &str) -> TestSummary {
        self.run_scenarios(ScenarioLibrary::scenarios_by_tag(tag))
    }

    /// Run specific scenarios by name
    pub fn run_by_names(&mut self, names: &[&str]) -> TestSummary {
        let scenarios = ScenarioLibrary::all_scenarios()
            .into_iter()
            .filter(|s| names.contains(&s.name.as_str()))
            .collect();
        self.run_scenarios(scenarios)
    }

    pub fn results(&self) -> &[ScenarioResult] {
        &self.results
    }

    /// Run a list of scenarios
    pub fn run_scenarios(&mut self, scenarios: Vec<ScanScenario>) -> TestSummary {
        let start = Instant::now();
        self.results.clear();

        let scenarios = self.filter_scenarios(scenarios);
        if self.config.verbose {
            println!("\n╔══════════════════════════════════════════════════════════════╗");
            println!("║                CHECK-IN SCANNER - SCENARIO RUN               ║");
            println!("╠══════════════════════════════════════════════════════════════╣");
            println!("║  Running {} scenario(s)", scenarios.len());
            println!("╚══════════════════════════════════════════════════════════════╝\n");
        }

        for scenario in scenarios {
            let result = self.run_single_scenario(&scenario);
            if self.config.verbose {
                print_result(&result);
            }

            let stop = self.config.fail_fast && !result.passed;
            self.results.push(result);
            if stop {
                if self.config.verbose {
                    println!("\n⚠️  Stopping early due to fail-fast mode\n");
                }
                break;
            }
        }

        let passed = self.results.iter().filter(|r| r.passed).count();
        let summary = TestSummary {
            total: self.results.len(),
            passed,
            failed: self.results.len() - passed,
            total_duration: start.elapsed(),
            results: self.results.clone(),
        };

        if self.config.verbose {
            print_summary(&summary);
        }
        summary
    }

    fn filter_scenarios(&self, scenarios: Vec<ScanScenario>) -> Vec<ScanScenario> {
        let mut filtered = scenarios;

        if let Some(ref tags) = self.config.tag_filter {
            filtered.retain(|s| s.tags.iter().any(|t| tags.contains(t)));
        }

        if let Some(ref pattern) = self.config.name_filter {
            let pattern = pattern.to_lowercase();
            filtered.retain(|s| s.name.to_lowercase().contains(&pattern));
        }

        filtered
    }

    fn run_single_scenario(&self, scenario: &ScanScenario) -> ScenarioResult {
        let start = Instant::now();
        if self.config.verbose {
            println!("▶ Running: {} - {}", scenario.name, scenario.description);
        }

        let outcome = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("failed to build runtime: {}", e))
            .and_then(|runtime| runtime.block_on(self.execute(scenario)));

        let (observed, failures) = match outcome {
            Ok(observed) => {
                let failures = compare(&observed, &scenario.expected);
                (observed, failures)
            }
            Err(e) => (Observed::default(), vec![e]),
        };

        ScenarioResult {
            name: scenario.name.clone(),
            passed: failures.is_empty(),
            duration: start.elapsed(),
            observed,
            tags: scenario.tags.clone(),
            failures,
        }
    }

    async fn execute(&self, scenario: &ScanScenario) -> Result<Observed, String> {
        let platform = Arc::new(MockCameraPlatform::new(scenario.camera.clone()));
        let decoders = ScriptedDecoderProvider::new();
        let decoder = decoders.probe();
        if let Some(e) = &scenario.decoder_start_error {
            decoder.fail_next_start(e.clone());
        }
        let sink = MockVideoSink::new("reader");
        let sink_probe = sink.probe();
        let submitter = Arc::new(
            RecordingSubmitter::scripted(scenario.check_ins.clone())
                .with_latency(scenario.submit_latency),
        );

        let coordinator = ScanCoordinator::new(
            ScanPlatform {
                enumerator: platform.clone(),
                acquirer: platform.clone(),
                decoders: Arc::new(decoders),
                sink: Box::new(sink),
            },
            submitter.clone(),
            CoordinatorSettings {
                resume_delay: self.config.resume_delay,
                keep_last_frame: true,
            },
        );

        let mut events = Vec::new();
        for (i, step) in scenario.steps.iter().enumerate() {
            debug!("[{}] step {}: {:?}", scenario.name, i + 1, step);
            match step {
                ScenarioStep::Open(event_id) => {
                    if let Err(e) = coordinator.open(event_id, "", Default::default()) {
                        debug!("[{}] open rejected: {}", scenario.name, e);
                    }
                }
                ScenarioStep::Settle => tokio::time::sleep(self.config.settle).await,
                ScenarioStep::CoolDown => {
                    tokio::time::sleep(self.config.resume_delay + self.config.settle * 2).await
                }
                ScenarioStep::Wait(duration) => tokio::time::sleep(*duration).await,
                ScenarioStep::Decode(payload) => {
                    if !decoder.emit_decode(payload) {
                        return Err(format!(
                            "step {}: decoder was not scanning when '{}' was decoded",
                            i + 1,
                            payload
                        ));
                    }
                }
                ScenarioStep::InjectDecode(payload) => {
                    decoder.inject_decode(payload);
                }
                ScenarioStep::DecoderError(message) => {
                    decoder.emit_scan_error(message);
                }
                ScenarioStep::DecoderExit => decoder.disconnect(),
                ScenarioStep::ReleaseAcquisition => platform.release_acquisition(),
                ScenarioStep::ClearAcquisitionError => platform.set_acquisition_error(None),
                ScenarioStep::Close => coordinator.close().await,
                ScenarioStep::Retry => {
                    coordinator
                        .retry()
                        .await
                        .map_err(|e| format!("step {}: retry failed: {}", i + 1, e))?;
                }
            }
            events.extend(coordinator.drain_events());
        }

        let stats = platform.stats();
        let snapshot = coordinator.snapshot();
        let mut observed = Observed {
            final_state: Some(coordinator.state()),
            submissions: submitter.call_count(),
            last_error: snapshot.as_ref().and_then(|s| s.last_error_kind),
            live_streams: stats.live_streams(),
            acquisitions: stats.acquisitions(),
            selected_device: snapshot.and_then(|s| s.selected_device_id),
            ..Default::default()
        };

        coordinator.close().await;
        tokio::time::sleep(self.config.settle).await;
        events.extend(coordinator.drain_events());

        let stats = platform.stats();
        observed.leaked_streams = stats.live_streams();
        observed.max_live_streams = stats.max_live_streams();
        observed.sink_attached_after_close = sink_probe.is_attached();
        observed.successes = events.iter().filter(|e| e.is_success()).count();
        observed.failures = events.iter().filter(|e| e.is_failure()).count();
        observed.transitions_after_close = transitions_after_close(&events);
        Ok(observed)
    }
}

fn transitions_after_close(events: &[ScanEvent]) -> usize {
    let mut closed = HashSet::new();
    let mut late = 0;
    for event in events {
        if let ScanEvent::StateChanged { generation, to, .. } = event {
            if closed.contains(generation) {
                late += 1;
            } else if to.is_closed() {
                closed.insert(*generation);
            }
        }
    }
    late
}

/// Compare observations with expectations; returns every mismatch
fn compare(observed: &Observed, expected: &ExpectedResults) -> Vec<String> {
    let mut failures = Vec::new();
    let mut check = |ok: bool, what: String| {
        if !ok {
            failures.push(what);
        }
    };

    check(
        observed.final_state == Some(expected.final_state),
        format!(
            "final state {:?}, expected {}",
            observed.final_state, expected.final_state
        ),
    );
    check(
        observed.submissions == expected.submissions,
        format!(
            "{} submission(s), expected {}",
            observed.submissions, expected.submissions
        ),
    );
    check(
        observed.successes == expected.successes,
        format!(
            "{} success event(s), expected {}",
            observed.successes, expected.successes
        ),
    );
    check(
        observed.failures == expected.failures,
        format!(
            "{} failure event(s), expected {}",
            observed.failures, expected.failures
        ),
    );
    check(
        observed.last_error == expected.last_error,
        format!(
            "last error {:?}, expected {:?}",
            observed.last_error, expected.last_error
        ),
    );
    check(
        observed.live_streams == expected.live_streams,
        format!(
            "{} live stream(s), expected {}",
            observed.live_streams, expected.live_streams
        ),
    );
    if let Some(acquisitions) = expected.acquisitions {
        check(
            observed.acquisitions == acquisitions,
            format!(
                "{} acquisition(s), expected {}",
                observed.acquisitions, acquisitions
            ),
        );
    }
    if let Some(ref device) = expected.selected_device {
        check(
            observed.selected_device.as_ref() == Some(device),
            format!(
                "selected {:?}, expected {}",
                observed.selected_device, device
            ),
        );
    }

    check(
        observed.max_live_streams <= 1,
        format!("{} streams were live at once", observed.max_live_streams),
    );
    check(
        observed.successes <= 1,
        "more than one success event".to_string(),
    );
    check(
        observed.transitions_after_close == 0,
        format!(
            "{} transition(s) after Closed",
            observed.transitions_after_close
        ),
    );
    check(
        observed.leaked_streams == 0,
        format!("{} stream(s) still live after close", observed.leaked_streams),
    );
    check(
        !observed.sink_attached_after_close,
        "video sink still attached after close".to_string(),
    );

    failures
}

fn print_result(result: &ScenarioResult) {
    let icon = if result.passed { "✅" } else { "❌" };
    println!(
        "  {} {} ({:.0?})",
        icon, result.name, result.duration
    );
    for failure in &result.failures {
        println!("      └─ {}", failure);
    }
}

fn print_summary(summary: &TestSummary) {
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                       SCENARIO SUMMARY                       ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Total:    {}", summary.total);
    println!("║  Passed:   {} ✅", summary.passed);
    println!("║  Failed:   {} ❌", summary.failed);
    println!("║  Rate:     {:.1}%", summary.pass_rate());
    println!("║  Duration: {:.2?}", summary.total_duration);
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let failed = summary.failed_scenarios();
    if !failed.is_empty() {
        println!("Failed scenarios:");
        for name in failed {
            println!("  • {}", name);
        }
        println!();
    }
}
