//! Handlebars rendering of composite secret values.
//!
//! Output is never HTML escaped and referencing an undefined variable is an
//! error. Helpers: `b64enc`, `b64dec`, `upper`, `lower`, `trim`.

use crate::errors::{Result, SyncError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use handlebars::{
    handlebars_helper, Context, Handlebars, Helper, HelperResult, Output, RenderContext,
    RenderErrorReason,
};
use std::collections::BTreeMap;

handlebars_helper!(b64enc: |s: str| STANDARD.encode(s));
handlebars_helper!(upper: |s: str| s.to_uppercase());
handlebars_helper!(lower: |s: str| s.to_lowercase());
handlebars_helper!(trim: |s: str| s.trim().to_string());

fn b64dec(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let encoded = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .ok_or(RenderErrorReason::ParamNotFoundForIndex("b64dec", 0))?;
    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|e| RenderErrorReason::Other(format!("b64dec: {}", e)))?;
    let text = String::from_utf8(decoded)
        .map_err(|_| RenderErrorReason::Other("b64dec: decoded value is not UTF-8".to_string()))?;
    out.write(&text)?;
    Ok(())
}

/// Renders field templates against resolved variables
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    registry: Handlebars<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.set_strict_mode(true);
        registry.register_helper("b64enc", Box::new(b64enc));
        registry.register_helper("b64dec", Box::new(b64dec));
        registry.register_helper("upper", Box::new(upper));
        registry.register_helper("lower", Box::new(lower));
        registry.register_helper("trim", Box::new(trim));
        Self { registry }
    }

    /// Render `template` with `variables` as the only context.
    pub fn render(&self, template: &str, variables: &BTreeMap<String, String>) -> Result<String> {
        self.registry.render_template(template, variables).map_err(|e| SyncError::template(e.to_string()))
    }
}
