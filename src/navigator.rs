//! Drives the site from a blank tab to "processing started".

use std::path::Path;

use crate::config::TimingSettings;
use crate::error::OcrError;
use crate::logging::DriverLogger;
use crate::page::{Control, ControlScope, PageError, SitePage, wait_until};

pub const FILE_INPUT_CONTROL: &str = "file input";
pub const START_CONTROL: &str = "Process Document button";

/// Load the site, dismiss the consent prompt if any, attach the document and
/// start processing, then sit out the warm-up period.
pub async fn navigate_and_submit<P: SitePage + ?Sized>(
    page: &P,
    target_url: &str,
    source_file: &Path,
    timings: &TimingSettings,
    logger: &DriverLogger,
) -> Result<(), OcrError> {
    page.goto(target_url).await?;
    logger.info(format!("loaded {target_url}"), Some("navigate"), None);

    match page
        .click_control(Control::Consent, ControlScope::Document, 0)
        .await
    {
        Ok(true) => logger.debug("dismissed consent prompt", Some("navigate"), None),
        Ok(false) => {}
        Err(err) => logger.debug(
            format!("consent prompt ignored: {err}"),
            Some("navigate"),
            None,
        ),
    }

    if !page.attach_file(source_file).await? {
        return Err(OcrError::control_not_found(FILE_INPUT_CONTROL));
    }
    logger.info(
        format!("file selected: {}", source_file.display()),
        Some("navigate"),
        None,
    );

    let visible = wait_until(
        timings.start_control_timeout(),
        timings.check_interval(),
        move || async move {
            let count = page
                .control_count(Control::StartProcessing, ControlScope::Document, true)
                .await?;
            Ok::<bool, PageError>(count > 0)
        },
    )
    .await?;
    if !visible
        || !page
            .click_control(Control::StartProcessing, ControlScope::Document, 0)
            .await?
    {
        return Err(OcrError::control_not_found(START_CONTROL));
    }

    logger.info(
        format!(
            "processing started, waiting {} ms before polling",
            timings.warmup_ms
        ),
        Some("navigate"),
        None,
    );
    tokio::time::sleep(timings.warmup()).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Verbosity;
    use crate::error::OcrErrorKind;
    use crate::testing::{MockSitePage, MockState};
    use std::time::Duration;
    use tokio::time::Instant;

    fn ready_page() -> MockSitePage {
        MockSitePage::new(MockState {
            consent_present: true,
            file_input: true,
            start_control: true,
            ..MockState::default()
        })
    }

    async fn submit(page: &MockSitePage) -> Result<(), OcrError> {
        navigate_and_submit(
            page,
            "https://ocr.test",
            Path::new("/tmp/doc.pdf"),
            &TimingSettings::default(),
            &DriverLogger::new(Verbosity::Minimal),
        )
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_runs_every_step_then_warms_up() {
        let page = ready_page();
        let started = Instant::now();

        submit(&page).await.expect("submitted");

        assert_eq!(
            page.calls(),
            vec![
                "goto:https://ocr.test".to_string(),
                "click:Consent@document#0".to_string(),
                "attach:/tmp/doc.pdf".to_string(),
                "click:StartProcessing@document#0".to_string(),
            ]
        );
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_consent_is_not_an_error() {
        let page = ready_page();
        page.with_state(|state| state.consent_present = false);
        submit(&page).await.expect("submitted");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_file_input_stops_before_processing() {
        let page = ready_page();
        page.with_state(|state| state.file_input = false);

        let err = submit(&page).await.expect_err("no input");
        assert!(matches!(&err, OcrError::ControlNotFound { control } if control == FILE_INPUT_CONTROL));
        assert!(
            !page
                .calls()
                .iter()
                .any(|call| call.starts_with("click:StartProcessing"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn start_control_may_appear_late() {
        let page = ready_page();
        page.with_state(|state| state.start_hidden_checks = 8);
        submit(&page).await.expect("submitted");
    }

    #[tokio::test(start_paused = true)]
    async fn start_control_never_visible_is_fatal() {
        let page = ready_page();
        page.with_state(|state| state.start_control = false);

        let started = Instant::now();
        let err = submit(&page).await.expect_err("no start control");
        assert_eq!(err.kind(), OcrErrorKind::ControlNotFound);
        assert!(err.to_string().contains(START_CONTROL));
        assert!(started.elapsed() >= Duration::from_secs(15));
        assert!(started.elapsed() < Duration::from_secs(60));
    }
}
