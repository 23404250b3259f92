use crate::error::Error;
use std::collections::BTreeMap;

/// Inputs for resolving one path template. `date` is the extracted
/// document date when the metadata collaborator supplied one; `fallback`
/// is the file's discovery (year, month), used — and flagged for review —
/// when it isn't.
pub struct TemplateContext<'a> {
    pub document_type: &'a str,
    pub date: Option<(i32, u32)>,
    pub fallback_date: (i32, u32),
    pub metadata: &'a BTreeMap<String, String>,
    pub filename: &'a str,
}

#[derive(Debug)]
pub struct RenderedPath {
    pub relative_path: String,
    /// Placeholders that fell back to a default substitution. A non-empty
    /// list flags the action for review.
    pub missing_keys: Vec<String>,
}

/// Substitution used when a named metadata key has no value.
const MISSING_VALUE: &str = "unknown";

/// Resolve a path template. Recognized placeholders: `{YYYY}`, `{MM}`,
/// `{type}`, `{filename}`, and any extracted-metadata key by name.
/// Malformed syntax (unclosed brace, empty placeholder) is a configuration
/// error and aborts the whole planner invocation.
pub fn render(template: &str, ctx: &TemplateContext) -> Result<RenderedPath, Error> {
    let mut out = String::with_capacity(template.len() + 16);
    let mut missing_keys = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            Error::Configuration(format!("unclosed placeholder in template '{template}'"))
        })?;
        let key = &after[..close];
        if key.is_empty() {
            return Err(Error::Configuration(format!(
                "empty placeholder in template '{template}'"
            )));
        }

        match key {
            "YYYY" => {
                let (year, _) = resolve_date(ctx, &mut missing_keys);
                out.push_str(&format!("{year:04}"));
            }
            "MM" => {
                let (_, month) = resolve_date(ctx, &mut missing_keys);
                out.push_str(&format!("{month:02}"));
            }
            "type" => out.push_str(&sanitize_component(ctx.document_type)),
            "filename" => out.push_str(&sanitize_component(ctx.filename)),
            name => match ctx.metadata.get(name) {
                Some(value) if !value.is_empty() => {
                    out.push_str(&sanitize_component(value));
                }
                _ => {
                    missing_keys.push(name.to_string());
                    out.push_str(MISSING_VALUE);
                }
            },
        }

        rest = &after[close + 1..];
    }
    if rest.contains('}') {
        return Err(Error::Configuration(format!(
            "stray '}}' in template '{template}'"
        )));
    }
    out.push_str(rest);

    Ok(RenderedPath {
        relative_path: out,
        missing_keys,
    })
}

fn resolve_date(ctx: &TemplateContext, missing_keys: &mut Vec<String>) -> (i32, u32) {
    match ctx.date {
        Some(date) => date,
        None => {
            if !missing_keys.iter().any(|k| k == "date") {
                missing_keys.push("date".to_string());
            }
            ctx.fallback_date
        }
    }
}

/// Make one substituted value safe as a single path segment: no
/// separators, no control characters, no reserved punctuation.
pub fn sanitize_component(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    cleaned
        .trim_matches(|c: char| c == ' ' || c == '.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with<'a>(
        metadata: &'a BTreeMap<String, String>,
        date: Option<(i32, u32)>,
    ) -> TemplateContext<'a> {
        TemplateContext {
            document_type: "financial_invoice",
            date,
            fallback_date: (2025, 3),
            metadata,
            filename: "invoice.pdf",
        }
    }

    #[test]
    fn renders_date_type_and_filename() {
        let metadata = BTreeMap::new();
        let rendered = render(
            "Financial/Invoices/{YYYY}/{MM}/{filename}",
            &ctx_with(&metadata, Some((2024, 11))),
        )
        .unwrap();
        assert_eq!(rendered.relative_path, "Financial/Invoices/2024/11/invoice.pdf");
        assert!(rendered.missing_keys.is_empty());
    }

    #[test]
    fn missing_date_falls_back_to_discovery_date_and_flags_review() {
        let metadata = BTreeMap::new();
        let rendered = render(
            "Financial/Invoices/{YYYY}/{MM}/{filename}",
            &ctx_with(&metadata, None),
        )
        .unwrap();
        assert_eq!(rendered.relative_path, "Financial/Invoices/2025/03/invoice.pdf");
        assert_eq!(rendered.missing_keys, vec!["date".to_string()]);
    }

    #[test]
    fn metadata_keys_substitute_and_missing_ones_use_placeholder() {
        let mut metadata = BTreeMap::new();
        metadata.insert("vendor".to_string(), "Acme Corp".to_string());
        let rendered = render("{type}/{vendor}/{invoice_no}/{filename}", &ctx_with(&metadata, Some((2024, 1)))).unwrap();
        assert_eq!(
            rendered.relative_path,
            "financial_invoice/Acme Corp/unknown/invoice.pdf"
        );
        assert_eq!(rendered.missing_keys, vec!["invoice_no".to_string()]);
    }

    #[test]
    fn malformed_template_is_a_configuration_error() {
        let metadata = BTreeMap::new();
        let err = render("Broken/{YYYY", &ctx_with(&metadata, None)).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        let err = render("Broken/{}", &ctx_with(&metadata, None)).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn substituted_values_cannot_escape_their_segment() {
        let mut metadata = BTreeMap::new();
        metadata.insert("vendor".to_string(), "../etc/passwd".to_string());
        let rendered = render("{vendor}/{filename}", &ctx_with(&metadata, Some((2024, 1)))).unwrap();
        assert!(!rendered.relative_path.contains(".."));
        assert!(rendered.relative_path.starts_with("_"));
    }
}
