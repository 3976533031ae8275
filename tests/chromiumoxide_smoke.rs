use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::info;
use olmocr_driver::config::{DriverConfig, TimingSettings};
use olmocr_driver::pipeline::OcrPipeline;
use olmocr_driver::runtime::ChromiumoxideRuntime;
use olmocr_driver::types::{ExtractionResult, ProcessingRequest};
use serde_json::Value;

/// Minimal stand-in for the OCR site: the start button renders one page
/// whose raw view opens a dialog with a single heading/pre pair. Button
/// labels differ from the configured text in case and spacing.
const FIXTURE: &str = r#"<!doctype html>
<html><body>
<input type="file" id="upload">
<button id="start">  PROCESS
  document </button>
<main id="out"></main>
<script>
document.getElementById('start').addEventListener('click', () => {
  setTimeout(() => {
    const page = document.createElement('div');
    page.className = 'page';
    page.innerHTML = '<p>Page one text</p><button class="raw">view  raw</button>';
    page.querySelector('.raw').addEventListener('click', () => {
      const dialog = document.createElement('div');
      dialog.setAttribute('role', 'dialog');
      dialog.innerHTML = '<h3>Markdown:</h3><pre># Hello</pre><button>Close</button>';
      dialog.querySelector('button').addEventListener('click', () => dialog.remove());
      document.body.appendChild(dialog);
    });
    document.getElementById('out').appendChild(page);
  }, 200);
});
</script>
</body></html>"#;

fn fast_timings() -> TimingSettings {
    TimingSettings {
        poll_interval_ms: 100,
        warmup_ms: 100,
        start_control_timeout_ms: 5_000,
        per_page_timeout_ms: 5_000,
        indicator_timeout_ms: 1_000,
        dialog_timeout_ms: 5_000,
        dialog_teardown_ms: 50,
        unscoped_settle_ms: 50,
        check_interval_ms: 50,
    }
}

#[tokio::test]
async fn chromiumoxide_drives_fixture_site_end_to_end() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let chrome_bin = match env::var("OLMOCR_CHROME_BIN") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => {
            eprintln!("skipping chromiumoxide integration test: OLMOCR_CHROME_BIN not set");
            return Ok(());
        }
    };

    if !chrome_bin.exists() {
        eprintln!(
            "skipping chromiumoxide integration test: chrome executable not found at {}",
            chrome_bin.display()
        );
        return Ok(());
    }

    let site = tempfile::tempdir().context("failed to create fixture dir")?;
    let index = site.path().join("index.html");
    std::fs::write(&index, FIXTURE).context("failed to write fixture page")?;
    let document = site.path().join("scan.pdf");
    std::fs::write(&document, b"%PDF-1.4\n").context("failed to write source document")?;

    let mut config = DriverConfig::default();
    config.headless = true;
    config.target_url = format!("file://{}", index.display());
    config.timings = fast_timings();
    config.local_browser_launch_options.insert(
        "chromeExecutable".into(),
        Value::String(chrome_bin.to_string_lossy().into()),
    );

    let pipeline = OcrPipeline::new(config, ChromiumoxideRuntime::new());
    let request = ProcessingRequest::new(&document)
        .with_page_limit(3)
        .with_overall_timeout(Duration::from_secs(20));

    let result = pipeline
        .run(&request)
        .await
        .context("pipeline run against fixture failed")?;
    assert!(
        !pipeline.runtime().is_running().await,
        "browser should be released after the run"
    );

    let ExtractionResult::Pages { data, raw } = result else {
        return Err(anyhow!("expected a pages result, got {}", result.kind()));
    };
    info!("Fixture produced {} page(s)", data.len());

    assert_eq!(data.len(), 1);
    assert_eq!(data[0].index, 1);
    assert!(
        data[0]
            .text
            .as_deref()
            .is_some_and(|text| text.contains("Page one text")),
        "expected page text in summary"
    );

    assert_eq!(raw.len(), 1);
    let items = raw[0]
        .raw_items()
        .ok_or_else(|| anyhow!("raw view failed: {:?}", raw[0]))?;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Markdown");
    assert_eq!(items[0].content, "# Hello");

    Ok(())
}
