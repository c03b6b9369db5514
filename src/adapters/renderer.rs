//! Token Renderer
//!
//! Minimal `PageRenderer` that fills a fixed set of metadata tokens. Full
//! templating belongs to the templating collaborator.

use crate::domain::{PageRenderer, ResponseMetadata, TenantRecord};
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenRenderer;

impl PageRenderer for TokenRenderer {
    fn render(
        &self,
        template: &str,
        record: &TenantRecord,
        metadata: &ResponseMetadata,
        path: &str,
    ) -> Result<String> {
        let display_name = record
            .extra
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(metadata.tenant_key.as_str());

        let tokens = [
            ("{{tenant_key}}", metadata.tenant_key.as_str()),
            ("{{name}}", display_name),
            ("{{path}}", path),
            ("{{design_profile}}", metadata.design_profile.as_str()),
            ("{{design_variant}}", metadata.design_variant.as_str()),
            (
                "{{experiment_id}}",
                metadata.experiment_id.as_deref().unwrap_or(""),
            ),
            (
                "{{experiment_variant}}",
                metadata.experiment_variant.as_deref().unwrap_or(""),
            ),
        ];

        let mut body = template.to_string();
        for (token, value) in tokens {
            if body.contains(token) {
                body = body.replace(token, value);
            }
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TenantKey;

    #[test]
    fn test_tokens_filled() {
        let mut record = TenantRecord::default();
        record
            .extra
            .insert("name".into(), serde_json::json!("Grand Royal"));
        let meta = ResponseMetadata::resolve(&TenantKey::parse("grand-royal").unwrap(), &record);

        let body = TokenRenderer
            .render(
                "<h1>{{name}}</h1><body class=\"{{design_variant}}\" data-path=\"{{path}}\">",
                &record,
                &meta,
                "/menu",
            )
            .unwrap();
        assert_eq!(
            body,
            "<h1>Grand Royal</h1><body class=\"calm\" data-path=\"/menu\">"
        );
    }

    #[test]
    fn test_name_falls_back_to_tenant_key() {
        let record = TenantRecord::default();
        let meta = ResponseMetadata::resolve(&TenantKey::parse("aw-bakery").unwrap(), &record);
        let body = TokenRenderer.render("{{name}}", &record, &meta, "/").unwrap();
        assert_eq!(body, "aw-bakery");
    }
}
