//! Sitemap Artifacts
//!
//! Renders the per-shard discovery document and the index that points at
//! every shard. Output depends only on its inputs, so concurrent
//! regenerations of the same shard produce identical bytes.

use chrono::SecondsFormat;

use crate::domain::ShardKey;
use crate::store::ShardIndexEntry;

const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Sitemap renderer for tenants served under `{tenant}.{base_domain}`
#[derive(Debug, Clone)]
pub struct SitemapGenerator {
    base_domain: String,
}

impl SitemapGenerator {
    pub fn new(base_domain: impl Into<String>) -> Self {
        Self {
            base_domain: base_domain.into(),
        }
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    /// Render one shard's `urlset`. An empty shard yields a valid empty set.
    pub fn render_shard(&self, entries: &[ShardIndexEntry]) -> String {
        let mut sorted: Vec<&ShardIndexEntry> = entries.iter().collect();
        sorted.sort_by(|a, b| a.tenant_key.cmp(&b.tenant_key));
        sorted.dedup_by(|a, b| a.tenant_key == b.tenant_key);

        let mut out = String::with_capacity(128 + sorted.len() * 96);
        out.push_str(XML_HEADER);
        out.push_str(&format!("<urlset xmlns=\"{}\">\n", SITEMAP_NS));
        for entry in sorted {
            out.push_str("  <url>\n");
            out.push_str(&format!(
                "    <loc>https://{}.{}/</loc>\n",
                escape(&entry.tenant_key),
                escape(&self.base_domain)
            ));
            if let Some(modified) = entry.last_modified {
                out.push_str(&format!(
                    "    <lastmod>{}</lastmod>\n",
                    modified.to_rfc3339_opts(SecondsFormat::Secs, true)
                ));
            }
            out.push_str("  </url>\n");
        }
        out.push_str("</urlset>\n");
        out
    }

    /// Render the index over the given shards. Needs no store access.
    pub fn render_index(&self, shards: impl IntoIterator<Item = ShardKey>) -> String {
        let mut out = String::with_capacity(64 * 1024);
        out.push_str(XML_HEADER);
        out.push_str(&format!("<sitemapindex xmlns=\"{}\">\n", SITEMAP_NS));
        for shard in shards {
            out.push_str(&format!(
                "  <sitemap><loc>https://{}/sitemaps/{}.xml</loc></sitemap>\n",
                escape(&self.base_domain),
                shard
            ));
        }
        out.push_str("</sitemapindex>\n");
        out
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
