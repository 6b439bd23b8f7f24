//! Handlers behind the `sinan` subcommands. Results go to stdout as JSON lines;
//! logs go to stderr.
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::agent_engine::engine::{ExecutionEngine, InstructionOutcome};
use crate::agent_engine::reporter::StepReporter;
use crate::agent_engine::session::ExecutionSession;
use crate::agent_engine::state::SessionStatus;
use crate::case::load_case;
use crate::config::{data_dir_or_cwd, AppConfig, VisionConfig};
use crate::device::manager::{DeviceDiscovery, DeviceRegistry};
use crate::device::monitor::DeviceMonitor;
use crate::device::traits::{Device, Platform};
use crate::errors::SinanResult;
use crate::perception::traits::{DisabledVision, VisionDetector};
use crate::perception::types::Element;
use crate::perception::ui_tree::normalize_raw_dump;
use crate::perception::vision::OpenAiVisionDetector;

fn emit<T: Serialize>(value: &T) -> SinanResult<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Builds the configured vision backend, or [`DisabledVision`] when vision is
/// off or its endpoint does not answer.
pub async fn build_vision(config: &VisionConfig) -> Arc<dyn VisionDetector> {
    if !config.enabled {
        tracing::info!("vision fallback disabled");
        return Arc::new(DisabledVision);
    }
    let detector = OpenAiVisionDetector::new(config);
    if detector.probe().await {
        tracing::info!(model = %config.model, api_base = %config.api_base, "vision fallback ready");
        Arc::new(detector)
    } else {
        tracing::warn!(api_base = %config.api_base, "vision endpoint unavailable; continuing without it");
        Arc::new(DisabledVision)
    }
}

/// `sinan devices`
pub async fn list_devices(registry: &DeviceRegistry) -> SinanResult<()> {
    let devices = registry.list_devices().await;
    tracing::info!(count = devices.len(), "devices listed");
    emit(&devices)
}

/// `sinan monitor`: prints one line per change until Ctrl-C.
pub async fn monitor(discovery: Arc<dyn DeviceDiscovery>, config: &AppConfig) -> SinanResult<()> {
    let monitor = Arc::new(DeviceMonitor::new(
        discovery,
        Duration::from_secs(config.monitor.interval_secs),
    ));
    let mut rx = monitor.subscribe();
    let poller = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.run().await })
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = rx.recv() => match event {
                Ok(event) => emit(&event)?,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "device events dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    monitor.stop();
    if let Err(e) = poller.await {
        tracing::warn!(error = %e, "device monitor task ended abnormally");
    }
    Ok(())
}

/// `sinan elements <dump>`: normalizes a hierarchy dump saved from a device.
pub fn list_elements(platform: Platform, dump: &Path) -> SinanResult<Vec<Element>> {
    let raw = std::fs::read_to_string(dump)?;
    let elements = normalize_raw_dump(platform, &raw);
    tracing::info!(path = %dump.display(), %platform, count = elements.len(), "dump normalized");
    emit(&elements)?;
    Ok(elements)
}

fn engine_for(
    device: Arc<dyn Device>,
    vision: Arc<dyn VisionDetector>,
    config: &AppConfig,
) -> ExecutionEngine {
    ExecutionEngine::new(device, vision, config.execution.clone())
        .with_alternates(config.alternates.clone())
}

/// `sinan exec --device <serial> <instruction>`
pub async fn exec_instruction(
    registry: &DeviceRegistry,
    config: &AppConfig,
    serial: &str,
    instruction: &str,
) -> SinanResult<InstructionOutcome> {
    let lease = registry.acquire(serial).await?;
    let vision = build_vision(&config.vision).await;
    let engine = engine_for(lease.device(), vision, config);

    let outcome = engine.execute_instruction(instruction).await?;
    tracing::info!(instruction, strategy = ?outcome.strategy(), "instruction handled");
    emit(&outcome)?;
    Ok(outcome)
}

/// `sinan run --device <serial> <case.json>`: streams session events and
/// cancels between steps on Ctrl-C.
pub async fn run_case(
    registry: &DeviceRegistry,
    config: &AppConfig,
    serial: &str,
    case_path: &Path,
    keep_going: bool,
) -> SinanResult<SessionStatus> {
    let case = load_case(case_path)?;
    let lease = registry.acquire(serial).await?;
    let vision = build_vision(&config.vision).await;
    let engine = engine_for(lease.device(), vision, config);

    let stop_on_error = config.execution.stop_on_error && !keep_going;
    let mut session = ExecutionSession::new(case.to_actions(config.execution.default_max_retries))
        .with_stop_on_error(stop_on_error);
    if config.execution.journal {
        session = session.with_journal(&data_dir_or_cwd().join("sessions"));
    }

    let handle = session.handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; cancelling after the current step");
            handle.cancel();
        }
    });

    let (reporter, mut rx) = StepReporter::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = emit(&event) {
                tracing::warn!(error = %e, "event not written");
            }
        }
    });

    tracing::info!(case = %case.case_id, name = %case.case_name, serial, "running case");
    let status = engine.run(&mut session, &reporter).await;

    drop(reporter);
    interrupt.abort();
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "event printer ended abnormally");
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::FakeDiscovery;

    fn quiet_config() -> AppConfig {
        let mut config = AppConfig::default_with_alternates();
        config.execution.retry_delay_ms = 0;
        config.execution.settle_delay_ms = 0;
        config
    }

    #[tokio::test]
    async fn disabled_vision_is_not_ready() {
        let vision = build_vision(&VisionConfig::default()).await;
        assert!(!vision.is_ready());
        assert_eq!(vision.name(), "disabled");
    }

    #[tokio::test]
    async fn case_runs_on_discovered_device() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case.json");
        std::fs::write(
            &path,
            r#"{"caseId": "tc_1", "caseName": "smoke",
                "steps": [{"stepId": 1, "action": "wait", "targetDesc": "idle", "timeoutSecs": 0},
                          {"stepId": 2, "action": "assert", "targetDesc": "首页"}]}"#,
        )
        .unwrap();
        let registry = DeviceRegistry::new(Arc::new(FakeDiscovery::new(vec![vec!["A"]])));

        let status = run_case(&registry, &quiet_config(), "A", &path, false)
            .await
            .unwrap();
        assert_eq!(status, SessionStatus::Passed);
    }

    #[test]
    fn saved_dumps_are_normalized_per_platform() {
        let dir = tempfile::tempdir().unwrap();
        let xml = dir.path().join("window_dump.xml");
        std::fs::write(
            &xml,
            r#"<hierarchy><node text="外卖" bounds="[100,200][300,260]"/></hierarchy>"#,
        )
        .unwrap();
        let json = dir.path().join("layout.json");
        std::fs::write(
            &json,
            r#"{"attributes": {"text": "设置", "bounds": "[0,0][100,50]"}, "children": []}"#,
        )
        .unwrap();

        let android = list_elements(Platform::Android, &xml).unwrap();
        assert_eq!(android.len(), 1);
        assert_eq!(android[0].center, (200, 230));
        let harmony = list_elements(Platform::Harmony, &json).unwrap();
        assert_eq!(harmony[0].center, (50, 25));
        // wrong dialect fails soft
        assert!(list_elements(Platform::Harmony, &xml).unwrap().is_empty());
        assert!(list_elements(Platform::Android, &dir.path().join("missing.xml")).is_err());
    }

    #[tokio::test]
    async fn unknown_serial_is_an_error() {
        let registry = DeviceRegistry::new(Arc::new(FakeDiscovery::new(vec![vec!["A"]])));
        let result = exec_instruction(&registry, &quiet_config(), "B", "点击外卖").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn instruction_on_empty_screen_is_not_found() {
        let registry = DeviceRegistry::new(Arc::new(FakeDiscovery::new(vec![vec!["A"]])));
        let outcome = exec_instruction(&registry, &quiet_config(), "A", "点击外卖")
            .await
            .unwrap();
        assert_eq!(outcome, InstructionOutcome::NotFound);
    }
}
