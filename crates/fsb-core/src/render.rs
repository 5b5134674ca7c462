//! Per-subscriber message rendering.
//!
//! Templates use `{{field}}` placeholders and `{{#if field}}..{{else}}..{{/if}}`
//! sections. Field values are escaped for the render mode the message is sent with.

use crate::{
    errors::Error,
    formatting::{escape_for, escape_html},
    messaging::types::RenderMode,
    Result,
};

/// Everything a template may reference for one (content, subscription) pair.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TemplateData {
    pub source_title: String,
    pub content_title: String,
    pub raw_link: String,
    pub preview_text: String,
    pub telegraph_url: String,
    pub tags: String,
    pub enable_telegraph: bool,
}

pub trait Renderer: Send + Sync {
    fn render(&self, data: &TemplateData, mode: RenderMode) -> Result<String>;
}

const DEFAULT_HTML: &str = "<b>{{source_title}}</b>
{{#if preview_text}}---------- Preview ----------
{{preview_text}}
-----------------------------
{{/if}}{{#if enable_telegraph}}{{content_title}} <a href=\"{{telegraph_url}}\">Telegraph</a> | <a href=\"{{raw_link}}\">Source</a>{{else}}<a href=\"{{raw_link}}\">{{content_title}}</a>{{/if}}
{{tags}}";

const DEFAULT_MARKDOWN: &str = "*{{source_title}}*
{{#if preview_text}}---------- Preview ----------
{{preview_text}}
-----------------------------
{{/if}}{{#if enable_telegraph}}{{content_title}} [Telegraph]({{telegraph_url}}) | [Source]({{raw_link}}){{else}}[{{content_title}}]({{raw_link}}){{/if}}
{{tags}}";

const DEFAULT_PLAIN: &str = "{{source_title}}
{{#if preview_text}}{{preview_text}}
{{/if}}{{content_title}}
{{#if enable_telegraph}}{{telegraph_url}}{{else}}{{raw_link}}{{/if}}
{{tags}}";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    SourceTitle,
    ContentTitle,
    RawLink,
    PreviewText,
    TelegraphUrl,
    Tags,
    EnableTelegraph,
}

impl Field {
    fn parse(name: &str) -> Result<Self> {
        Ok(match name {
            "source_title" => Field::SourceTitle,
            "content_title" => Field::ContentTitle,
            "raw_link" => Field::RawLink,
            "preview_text" => Field::PreviewText,
            "telegraph_url" => Field::TelegraphUrl,
            "tags" => Field::Tags,
            "enable_telegraph" => Field::EnableTelegraph,
            other => return Err(Error::Render(format!("unknown template field: {other}"))),
        })
    }

    fn is_url(self) -> bool {
        matches!(self, Field::RawLink | Field::TelegraphUrl)
    }

    fn value(self, data: &TemplateData) -> &str {
        match self {
            Field::SourceTitle => &data.source_title,
            Field::ContentTitle => &data.content_title,
            Field::RawLink => &data.raw_link,
            Field::PreviewText => &data.preview_text,
            Field::TelegraphUrl => &data.telegraph_url,
            Field::Tags => &data.tags,
            Field::EnableTelegraph => {
                if data.enable_telegraph {
                    "true"
                } else {
                    ""
                }
            }
        }
    }

    fn truthy(self, data: &TemplateData) -> bool {
        !self.value(data).trim().is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Node {
    Text(String),
    Field(Field),
    If {
        field: Field,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

struct Frame {
    field: Field,
    then: Vec<Node>,
    otherwise: Option<Vec<Node>>,
}

fn current<'a>(stack: &'a mut [Frame], root: &'a mut Vec<Node>) -> &'a mut Vec<Node> {
    match stack.last_mut() {
        Some(frame) => match &mut frame.otherwise {
            Some(otherwise) => otherwise,
            None => &mut frame.then,
        },
        None => root,
    }
}

fn parse(src: &str) -> Result<Vec<Node>> {
    let mut root = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut rest = src;

    loop {
        let Some(start) = rest.find("{{") else {
            if !rest.is_empty() {
                current(&mut stack, &mut root).push(Node::Text(rest.to_string()));
            }
            break;
        };
        if start > 0 {
            current(&mut stack, &mut root).push(Node::Text(rest[..start].to_string()));
        }

        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| Error::Render("unterminated template tag".to_string()))?;
        let tag = after[..end].trim();
        rest = &after[end + 2..];

        if let Some(name) = tag.strip_prefix("#if ") {
            stack.push(Frame {
                field: Field::parse(name.trim())?,
                then: Vec::new(),
                otherwise: None,
            });
        } else if tag == "else" {
            let frame = stack
                .last_mut()
                .ok_or_else(|| Error::Render("{{else}} outside of {{#if}}".to_string()))?;
            if frame.otherwise.is_some() {
                return Err(Error::Render("duplicate {{else}}".to_string()));
            }
            frame.otherwise = Some(Vec::new());
        } else if tag == "/if" {
            let frame = stack
                .pop()
                .ok_or_else(|| Error::Render("{{/if}} without {{#if}}".to_string()))?;
            current(&mut stack, &mut root).push(Node::If {
                field: frame.field,
                then: frame.then,
                otherwise: frame.otherwise.unwrap_or_default(),
            });
        } else {
            current(&mut stack, &mut root).push(Node::Field(Field::parse(tag)?));
        }
    }

    if !stack.is_empty() {
        return Err(Error::Render("unclosed {{#if}} section".to_string()));
    }
    Ok(root)
}

fn render_nodes(nodes: &[Node], data: &TemplateData, mode: RenderMode, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Field(f) => {
                let v = f.value(data);
                // URLs go inside link syntax: Markdown must see them raw.
                if f.is_url() && mode != RenderMode::Html {
                    out.push_str(v);
                } else if f.is_url() {
                    out.push_str(&escape_html(v));
                } else {
                    out.push_str(&escape_for(mode, v));
                }
            }
            Node::If {
                field,
                then,
                otherwise,
            } => {
                let branch = if field.truthy(data) { then } else { otherwise };
                render_nodes(branch, data, mode, out);
            }
        }
    }
}

/// Renderer backed by a per-mode default template or one configured override.
#[derive(Clone, Debug)]
pub struct TemplateRenderer {
    custom: Option<Vec<Node>>,
    html: Vec<Node>,
    markdown: Vec<Node>,
    plain: Vec<Node>,
}

impl TemplateRenderer {
    /// Parse the templates up front so syntax errors surface at startup.
    pub fn new(custom: Option<&str>) -> Result<Self> {
        Ok(Self {
            custom: custom.map(parse).transpose()?,
            html: parse(DEFAULT_HTML)?,
            markdown: parse(DEFAULT_MARKDOWN)?,
            plain: parse(DEFAULT_PLAIN)?,
        })
    }
}

impl Renderer for TemplateRenderer {
    fn render(&self, data: &TemplateData, mode: RenderMode) -> Result<String> {
        let nodes = match (&self.custom, mode) {
            (Some(custom), _) => custom,
            (None, RenderMode::Html) => &self.html,
            (None, RenderMode::Markdown) => &self.markdown,
            (None, RenderMode::Plain) => &self.plain,
        };

        let mut out = String::new();
        render_nodes(nodes, data, mode, &mut out);

        let out = out.trim();
        if out.is_empty() {
            return Err(Error::Render("template rendered an empty message".to_string()));
        }
        Ok(out.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> TemplateData {
        TemplateData {
            source_title: "Rust Blog".to_string(),
            content_title: "Async <fn> in traits".to_string(),
            raw_link: "https://blog.rust-lang.org/a_b?x=1&y=2".to_string(),
            preview_text: String::new(),
            telegraph_url: "https://telegra.ph/x".to_string(),
            tags: "#rust".to_string(),
            enable_telegraph: false,
        }
    }

    #[test]
    fn default_html_escapes_and_links_source() {
        let r = TemplateRenderer::new(None).unwrap();
        let out = r.render(&data(), RenderMode::Html).unwrap();
        assert_eq!(
            out,
            "<b>Rust Blog</b>\n<a href=\"https://blog.rust-lang.org/a_b?x=1&amp;y=2\">Async &lt;fn&gt; in traits</a>\n#rust"
        );
    }

    #[test]
    fn telegraph_branch_and_preview_section() {
        let r = TemplateRenderer::new(None).unwrap();
        let mut d = data();
        d.enable_telegraph = true;
        d.preview_text = "short".to_string();
        let out = r.render(&d, RenderMode::Markdown).unwrap();
        assert!(out.contains("---------- Preview ----------\nshort\n"));
        assert!(out.contains("[Telegraph](https://telegra.ph/x)"));
        // URLs stay raw inside markdown links.
        assert!(out.contains("[Source](https://blog.rust-lang.org/a_b?x=1&y=2)"));
    }

    #[test]
    fn custom_template_overrides_every_mode() {
        let r = TemplateRenderer::new(Some("{{content_title}} {{tags}}")).unwrap();
        let out = r.render(&data(), RenderMode::Plain).unwrap();
        assert_eq!(out, "Async <fn> in traits #rust");
    }

    #[test]
    fn syntax_errors_are_render_errors() {
        for bad in [
            "{{nope}}",
            "{{#if tags}}x",
            "{{/if}}",
            "{{else}}",
            "{{tags",
            "{{#if tags}}a{{else}}b{{else}}c{{/if}}",
        ] {
            let err = TemplateRenderer::new(Some(bad)).unwrap_err();
            assert!(matches!(err, Error::Render(_)), "{bad}: {err}");
        }
    }

    #[test]
    fn empty_output_fails() {
        let r = TemplateRenderer::new(Some("{{tags}}")).unwrap();
        let mut d = data();
        d.tags.clear();
        assert!(matches!(
            r.render(&d, RenderMode::Html),
            Err(Error::Render(_))
        ));
    }
}
