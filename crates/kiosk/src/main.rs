use anyhow::Context;
use kiosk::{
    camera::Camera,
    config::KioskConfig,
    recognize::RecognizeClient,
    scheduler::TickScheduler,
    service::CaptureLoop,
    status::LogStatusSink,
};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    flag,
};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

fn main() -> anyhow::Result<()> {
    let config = KioskConfig::from_env();
    common::setup_logging(config.environment);

    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, Arc::clone(&shutdown))?;
    flag::register(SIGINT, Arc::clone(&shutdown))?;
    tracing::info!("Signal handlers registered (SIGTERM, SIGINT)");

    tracing::info!("Kiosk starting with config: {:?}", config);

    let mut camera = Camera::new(config.jpeg_quality);
    camera
        .acquire(&config.camera_constraints())
        .context("Failed to acquire camera - check V4L2 device availability")?;

    let recognizer = RecognizeClient::new(
        config.recognize_url.clone(),
        config.request_timeout(),
        config.submit_attempts,
        config.retry_base_delay(),
    )
    .context("Failed to build recognition client")?;

    let mut scheduler = TickScheduler::new(config.capture_interval());
    let mut capture_loop = CaptureLoop::new(
        camera,
        recognizer,
        LogStatusSink,
        config.pause_duration(),
    );

    capture_loop.run(&mut scheduler, &shutdown);

    // Free the camera hardware deliberately; Drop covers abnormal exits.
    let mut camera = capture_loop.into_source();
    camera.release();

    tracing::info!("Kiosk stopped gracefully");
    Ok(())
}
