//! One complete OCR run: launch, navigate, extract, release.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::browser::{BrowserRuntime, LaunchPlan};
use crate::classifier::{Classifier, HeuristicClassifier};
use crate::config::DriverConfig;
use crate::error::OcrError;
use crate::extractor::ResultExtractor;
use crate::logging::DriverLogger;
use crate::navigator::navigate_and_submit;
use crate::page::SitePage;
use crate::runtime::ChromiumoxideRuntime;
use crate::types::{ExtractionResult, ProcessingRequest};

/// Page the runtime opens before the navigator takes over.
const BLANK_PAGE: &str = "about:blank";

/// Callbacks invoked while the page is still open.
#[async_trait]
pub trait RunHooks<P: SitePage + ?Sized>: Send + Sync {
    /// Called when navigation or extraction failed, before the browser is
    /// released.
    async fn on_failure(&self, _page: &P, _error: &OcrError) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl<P: SitePage + ?Sized> RunHooks<P> for NoHooks {}

/// Saves a full-page screenshot when a run fails.
#[derive(Debug, Clone)]
pub struct FailureScreenshot {
    path: PathBuf,
    logger: Arc<DriverLogger>,
}

impl FailureScreenshot {
    pub fn new(path: impl Into<PathBuf>, logger: Arc<DriverLogger>) -> Self {
        Self {
            path: path.into(),
            logger,
        }
    }
}

#[async_trait]
impl<P: SitePage + ?Sized> RunHooks<P> for FailureScreenshot {
    async fn on_failure(&self, page: &P, _error: &OcrError) {
        match page.screenshot(&self.path).await {
            Ok(()) => self.logger.info(
                format!("saved failure screenshot to {}", self.path.display()),
                Some("runtime"),
                None,
            ),
            Err(err) => self.logger.error(
                format!("failed to capture screenshot: {err}"),
                Some("runtime"),
                None,
            ),
        }
    }
}

pub struct OcrPipeline<R: BrowserRuntime> {
    config: DriverConfig,
    runtime: R,
    classifier: Arc<dyn Classifier>,
    logger: Arc<DriverLogger>,
}

impl<R: BrowserRuntime> OcrPipeline<R> {
    pub fn new(config: DriverConfig, runtime: R) -> Self {
        let classifier = Arc::new(HeuristicClassifier::new(config.heuristics.clone()));
        let logger = Arc::new(DriverLogger::from_config(&config));
        Self {
            config,
            runtime,
            classifier,
            logger,
        }
    }

    pub fn with_classifier(mut self, classifier: impl Classifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn logger(&self) -> Arc<DriverLogger> {
        Arc::clone(&self.logger)
    }

    pub async fn run(&self, request: &ProcessingRequest) -> Result<ExtractionResult, OcrError> {
        self.run_with_hooks(request, &NoHooks).await
    }

    /// Run the request. Once the browser launched, it is shut down exactly
    /// once whatever the outcome; a shutdown failure is logged and does not
    /// replace the run's own result.
    pub async fn run_with_hooks<H>(
        &self,
        request: &ProcessingRequest,
        hooks: &H,
    ) -> Result<ExtractionResult, OcrError>
    where
        H: RunHooks<R::Page> + ?Sized,
    {
        validate_request(request).await?;
        let plan = LaunchPlan::from_config(&self.config)?;

        self.logger.debug(
            "launching browser",
            Some("runtime"),
            Some(json!({ "attach": plan.is_attach(), "headless": plan.launch_options.headless })),
        );
        self.runtime.launch(&plan).await?;

        let outcome = self.drive(request, hooks).await;

        if let Err(err) = self.runtime.shutdown().await {
            self.logger.error(
                format!("browser shutdown failed: {err}"),
                Some("runtime"),
                None,
            );
        }

        match &outcome {
            Ok(result) => self.logger.info(
                format!("run finished with {} result", result.kind()),
                Some("runtime"),
                None,
            ),
            Err(err) => self
                .logger
                .error(format!("run failed: {err}"), Some("runtime"), None),
        }
        outcome
    }

    async fn drive<H>(
        &self,
        request: &ProcessingRequest,
        hooks: &H,
    ) -> Result<ExtractionResult, OcrError>
    where
        H: RunHooks<R::Page> + ?Sized,
    {
        let page = self
            .runtime
            .open_page(BLANK_PAGE, &self.config.selectors)
            .await?;

        let result = self.drive_page(&page, request).await;
        if let Err(err) = &result {
            hooks.on_failure(&page, err).await;
        }
        result
    }

    async fn drive_page(
        &self,
        page: &R::Page,
        request: &ProcessingRequest,
    ) -> Result<ExtractionResult, OcrError> {
        let timings = &self.config.timings;
        navigate_and_submit(
            page,
            &self.config.target_url,
            request.source_file_path(),
            timings,
            &self.logger,
        )
        .await?;

        let mut extractor =
            ResultExtractor::new(page, self.classifier.as_ref(), timings, &self.logger);
        extractor
            .run(request.page_limit(), request.overall_timeout())
            .await
    }
}

async fn validate_request(request: &ProcessingRequest) -> Result<(), OcrError> {
    if request.page_limit() == 0 {
        return Err(OcrError::InvalidRequest(
            "page limit must be at least 1".to_string(),
        ));
    }
    let path = request.source_file_path();
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(OcrError::InvalidRequest(format!(
            "{} is not a file",
            path.display()
        ))),
        Err(err) => Err(OcrError::InvalidRequest(format!(
            "cannot read {}: {err}",
            path.display()
        ))),
    }
}

/// Run a request against a freshly launched local Chrome.
pub async fn run_ocr(
    config: DriverConfig,
    request: &ProcessingRequest,
) -> Result<ExtractionResult, OcrError> {
    OcrPipeline::new(config, ChromiumoxideRuntime::new())
        .run(request)
        .await
}
