//! JavaScript checks evaluated in the OCR site's page.
//!
//! Each builder returns a self-invoking function expression. Selectors and
//! other arguments are embedded as a JSON literal so nothing coming from
//! configuration is ever spliced into the script source unescaped.

use serde_json::json;

use crate::selectors::{ControlSelector, SiteSelectors};

/// Shared helpers available to every script body.
const PRELUDE: &str = r#"
    const textOf = (el) => (el && (el.innerText ?? el.textContent)) || '';
    const normalise = (text) => String(text).replace(/\s+/g, ' ').trim().toLowerCase();
    const hasText = (el, text) => normalise(textOf(el)).includes(normalise(text));
    const isVisible = (el) => {
        if (!el || !el.isConnected) return false;
        const style = window.getComputedStyle(el);
        if (style.visibility === 'hidden' || style.display === 'none') return false;
        const rect = el.getBoundingClientRect();
        return rect.width > 0 && rect.height > 0;
    };
    const matching = (root, control) => {
        if (!root) return [];
        return Array.from(root.querySelectorAll(control.css))
            .filter((el) => control.text == null || hasText(el, control.text));
    };
    const imagesIn = (root, selector) => Array.from(root.querySelectorAll(selector))
        .map((img) => ({ src: img.src || '', alt: img.alt || '' }));
"#;

/// Where a script starts its search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptScope {
    Document,
    /// The n-th element matching the page-container selector.
    Container(usize),
    /// The first open dialog.
    Dialog,
}

fn wrap(args: serde_json::Value, body: &str) -> Result<String, serde_json::Error> {
    let args_json = serde_json::to_string(&args)?;
    Ok(format!(
        "(function(args) {{
            {prelude}
            {body}
        }})({args})",
        prelude = PRELUDE,
        body = body,
        args = args_json
    ))
}

fn scope_args(scope: ScriptScope, selectors: &SiteSelectors) -> serde_json::Value {
    match scope {
        ScriptScope::Document => json!({ "kind": "document" }),
        ScriptScope::Container(index) => json!({
            "kind": "container",
            "selector": selectors.page_containers,
            "index": index,
        }),
        ScriptScope::Dialog => json!({ "kind": "dialog", "selector": selectors.dialog }),
    }
}

const RESOLVE_SCOPE: &str = r#"
    const resolveScope = (scope) => {
        switch (scope.kind) {
            case 'container':
                return document.querySelectorAll(scope.selector)[scope.index] || null;
            case 'dialog':
                return document.querySelector(scope.selector);
            default:
                return document;
        }
    };
"#;

/// Snapshot of containers, qualifying images and candidate text blocks.
pub fn observe_script(selectors: &SiteSelectors) -> Result<String, serde_json::Error> {
    wrap(
        json!({
            "containers": selectors.page_containers,
            "images": selectors.images,
            "textBlocks": selectors.text_blocks,
        }),
        r#"
        const containers = Array.from(document.querySelectorAll(args.containers))
            .map((el) => ({ text: textOf(el), images: imagesIn(el, args.images) }));
        const images = imagesIn(document, args.images)
            .filter((img) => img.src && !img.src.startsWith('data:'));
        const textBlocks = Array.from(document.querySelectorAll(args.textBlocks))
            .map((el) => el.innerText ?? el.value ?? '')
            .filter(Boolean);
        return { containers, images, textBlocks };
        "#,
    )
}

pub fn container_count_script(selectors: &SiteSelectors) -> Result<String, serde_json::Error> {
    wrap(
        json!({ "containers": selectors.page_containers }),
        "return document.querySelectorAll(args.containers).length;",
    )
}

/// True while the container still shows the processing text.
pub fn processing_text_script(
    selectors: &SiteSelectors,
    index: usize,
) -> Result<String, serde_json::Error> {
    wrap(
        json!({
            "scope": scope_args(ScriptScope::Container(index), selectors),
            "text": selectors.processing_text,
        }),
        &format!(
            "{RESOLVE_SCOPE}
            const root = resolveScope(args.scope);
            return !!root && hasText(root, args.text);"
        ),
    )
}

/// True while the container holds any loading indicator.
pub fn loading_indicator_script(
    selectors: &SiteSelectors,
    index: usize,
) -> Result<String, serde_json::Error> {
    wrap(
        json!({
            "scope": scope_args(ScriptScope::Container(index), selectors),
            "indicators": selectors.loading_indicators,
        }),
        &format!(
            "{RESOLVE_SCOPE}
            const root = resolveScope(args.scope);
            return !!root && root.querySelector(args.indicators) !== null;"
        ),
    )
}

pub fn control_count_script(
    selectors: &SiteSelectors,
    control: &ControlSelector,
    scope: ScriptScope,
    visible_only: bool,
) -> Result<String, serde_json::Error> {
    wrap(
        json!({
            "scope": scope_args(scope, selectors),
            "control": control,
            "visibleOnly": visible_only,
        }),
        &format!(
            "{RESOLVE_SCOPE}
            const found = matching(resolveScope(args.scope), args.control);
            return (args.visibleOnly ? found.filter(isVisible) : found).length;"
        ),
    )
}

/// Scrolls the `position`-th matching control into view and clicks it.
/// Evaluates to `false` when there is no such control.
pub fn click_control_script(
    selectors: &SiteSelectors,
    control: &ControlSelector,
    scope: ScriptScope,
    position: usize,
) -> Result<String, serde_json::Error> {
    wrap(
        json!({
            "scope": scope_args(scope, selectors),
            "control": control,
            "position": position,
        }),
        &format!(
            "{RESOLVE_SCOPE}
            const el = matching(resolveScope(args.scope), args.control)[args.position];
            if (!el) return false;
            el.scrollIntoView({{ block: 'center', inline: 'center' }});
            el.click();
            return true;"
        ),
    )
}

pub fn element_exists_script(selector: &str) -> Result<String, serde_json::Error> {
    wrap(
        json!({ "selector": selector }),
        "return document.querySelector(args.selector) !== null;",
    )
}

/// Headings of the open dialog with the element that follows each one, plus
/// every preformatted block.
pub fn dialog_snapshot_script(selectors: &SiteSelectors) -> Result<String, serde_json::Error> {
    wrap(
        json!({
            "dialog": selectors.dialog,
            "heading": selectors.dialog_heading,
            "preformatted": selectors.dialog_preformatted,
        }),
        r#"
        const dialog = document.querySelector(args.dialog);
        if (!dialog) return { headings: [], preformatted: [] };
        const headings = Array.from(dialog.querySelectorAll(args.heading)).map((h) => {
            const next = h.nextElementSibling;
            return {
                title: textOf(h),
                nextTag: next ? next.tagName.toLowerCase() : null,
                nextText: next ? textOf(next) : null,
            };
        });
        const preformatted = Array.from(dialog.querySelectorAll(args.preformatted)).map(textOf);
        return { headings, preformatted };
        "#,
    )
}
