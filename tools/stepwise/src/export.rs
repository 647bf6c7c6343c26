use std::path::Path;

use serde_json::json;

use crate::errors::GuideError;
use crate::ledger::StepLedger;
use crate::logging::append_run_log;
use crate::runtime::FileSystem;
use crate::types::{ExportFormat, Step};

pub const DEFAULT_GUIDE_NAME: &str = "How-To-Guide";

const HTML_STYLE: &str = concat!(
    "    body { font-family: sans-serif; line-height: 1.6; max-width: 800px; margin: 20px auto; padding: 20px; }\n",
    "    .step { margin-bottom: 30px; border-bottom: 1px solid #eee; padding-bottom: 20px; }\n",
    "    h2 { color: #333; }\n",
    "    p { color: #555; }\n",
    "    img { max-width: 100%; height: auto; border: 1px solid #ccc; border-radius: 8px; margin-top: 10px; }\n",
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedGuide {
    pub content: String,
    pub filename: String,
    pub mime_type: &'static str,
}

pub fn render(guide_name: &str, steps: &[Step], format: ExportFormat) -> RenderedGuide {
    let heading = display_name(guide_name);
    let content = match format {
        ExportFormat::Html => render_html(heading, steps),
        ExportFormat::Markdown => render_markdown(heading, steps),
    };
    RenderedGuide {
        content,
        filename: format!(
            "{}.{}",
            sanitize_filename_stem(guide_name),
            format.extension()
        ),
        mime_type: format.mime_type(),
    }
}

/// Render the ledger's current guide and write it to `out_dir`.
pub fn export_guide(
    ledger: &StepLedger,
    fs: &dyn FileSystem,
    out_dir: &Path,
    guide_name: &str,
    format: ExportFormat,
) -> Result<RenderedGuide, GuideError> {
    let steps = ledger.list_steps()?;
    let rendered = render(guide_name, &steps, format);
    let path = out_dir.join(&rendered.filename);
    append_run_log(
        "info",
        "export.guide.started",
        json!({
            "path": path.display().to_string(),
            "format": format.extension(),
            "step_count": steps.len(),
        }),
    );
    fs.create_dir_all(out_dir)?;
    fs.write_string(&path, &rendered.content)?;
    append_run_log(
        "info",
        "export.guide.written",
        json!({
            "path": path.display().to_string(),
            "bytes": rendered.content.len(),
        }),
    );
    Ok(rendered)
}

fn display_name(guide_name: &str) -> &str {
    match guide_name.trim() {
        "" => DEFAULT_GUIDE_NAME,
        trimmed => trimmed,
    }
}

/// Reduce a guide name to `[A-Za-z0-9-]`, joining words with `-`.
pub fn sanitize_filename_stem(guide_name: &str) -> String {
    let kept: String = guide_name
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || c.is_ascii_whitespace())
        .collect();
    let stem = kept.split_ascii_whitespace().collect::<Vec<_>>().join("-");
    if stem.is_empty() {
        DEFAULT_GUIDE_NAME.to_string()
    } else {
        stem
    }
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            other => out.push(other),
        }
    }
    out
}

fn render_html(heading: &str, steps: &[Step]) -> String {
    let heading = escape_html(heading);
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    out.push_str("  <meta charset=\"UTF-8\">\n");
    out.push_str(&format!("  <title>{heading}</title>\n"));
    out.push_str("  <style>\n");
    out.push_str(HTML_STYLE);
    out.push_str("  </style>\n</head>\n<body>\n");
    out.push_str(&format!("  <h1>{heading}</h1>\n"));

    for (index, step) in steps.iter().enumerate() {
        let title = escape_html(&step.title);
        out.push_str("  <div class=\"step\">\n");
        out.push_str(&format!("    <h2>Step {}: {title}</h2>\n", index + 1));
        out.push_str(&format!(
            "    <p>{}</p>\n",
            escape_html(&step.description).replace('\n', "<br>")
        ));
        out.push_str(&format!(
            "    <img src=\"{}\" alt=\"Screenshot for {title}\">\n",
            escape_html(step.screenshot.as_str())
        ));
        out.push_str("  </div>\n");
    }

    out.push_str("</body>\n</html>\n");
    out
}

// Markdown output is not escaped: titles and descriptions go in verbatim.
fn render_markdown(heading: &str, steps: &[Step]) -> String {
    let mut out = format!("# {heading}\n\n");
    for (index, step) in steps.iter().enumerate() {
        out.push_str(&format!("## Step {}: {}\n\n", index + 1, step.title));
        if !step.description.is_empty() {
            out.push_str(&step.description);
            out.push_str("\n\n");
        }
        out.push_str(&format!(
            "![{}]({})\n\n",
            step.title,
            step.screenshot.as_str()
        ));
        out.push_str("---\n\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::tempdir;

    use super::*;
    use crate::runtime::FakeFileSystem;
    use crate::types::ScreenshotRef;

    fn step(title: &str, description: &str) -> Step {
        Step {
            title: title.to_string(),
            screenshot: ScreenshotRef::new("data:image/png;base64,AAA"),
            description: description.to_string(),
        }
    }

    #[test]
    fn filename_keeps_only_safe_characters() {
        assert_eq!(sanitize_filename_stem("My Guide!! 2024"), "My-Guide-2024");
        assert_eq!(sanitize_filename_stem("  a/b:c  d\te "), "abc-d-e");
        assert_eq!(sanitize_filename_stem("pre-flight check"), "pre-flight-check");
        assert_eq!(sanitize_filename_stem("   "), DEFAULT_GUIDE_NAME);
        assert_eq!(sanitize_filename_stem("!!!"), DEFAULT_GUIDE_NAME);
        assert_eq!(sanitize_filename_stem("Café ☕"), "Caf");
    }

    #[test]
    fn empty_name_uses_default_heading_and_filename() {
        let rendered = render("  ", &[], ExportFormat::Markdown);
        assert_eq!(rendered.content, "# How-To-Guide\n\n");
        assert_eq!(rendered.filename, "How-To-Guide.md");
        assert_eq!(rendered.mime_type, "text/markdown");
    }

    #[test]
    fn markdown_layout_matches_guide_structure() {
        let rendered = render(
            "Setup",
            &[step("Clicked on \"Go\"", ""), step("Typed", "note")],
            ExportFormat::Markdown,
        );
        assert_eq!(
            rendered.content,
            "# Setup\n\n\
             ## Step 1: Clicked on \"Go\"\n\n\
             ![Clicked on \"Go\"](data:image/png;base64,AAA)\n\n---\n\n\
             ## Step 2: Typed\n\n\
             note\n\n\
             ![Typed](data:image/png;base64,AAA)\n\n---\n\n"
        );
    }

    #[test]
    fn html_escapes_and_markdown_does_not() {
        let steps = [step("<b>", "x")];
        let html = render("G", &steps, ExportFormat::Html);
        assert!(html.content.contains("<h2>Step 1: &lt;b&gt;</h2>"));
        assert!(html.content.contains("alt=\"Screenshot for &lt;b&gt;\""));
        assert!(!html.content.contains("<b>"));
        assert_eq!(html.filename, "G.html");
        assert_eq!(html.mime_type, "text/html");

        let md = render("G", &steps, ExportFormat::Markdown);
        assert!(md.content.contains("## Step 1: <b>"));
    }

    #[test]
    fn description_markup_is_escaped_only_in_html() {
        let steps = [step("Clicked on \"Submit\"", "Use this <b>button</b>")];

        let html = render("G", &steps, ExportFormat::Html);
        assert!(html
            .content
            .contains("<p>Use this &lt;b&gt;button&lt;/b&gt;</p>"));
        assert!(!html.content.contains("<b>button</b>"));

        let md = render("G", &steps, ExportFormat::Markdown);
        assert!(md.content.contains("\n\nUse this <b>button</b>\n\n"));
    }

    #[test]
    fn html_breaks_description_lines_after_escaping() {
        let html = render("G", &[step("t", "a & b\n'c'")], ExportFormat::Html);
        assert!(html.content.contains("<p>a &amp; b<br>&#039;c&#039;</p>"));
    }

    #[test]
    fn html_heading_and_title_use_escaped_name() {
        let html = render(" Tom & \"Jerry\" ", &[], ExportFormat::Html);
        assert!(html.content.contains("<title>Tom &amp; &quot;Jerry&quot;</title>"));
        assert!(html.content.contains("<h1>Tom &amp; &quot;Jerry&quot;</h1>"));
        assert!(html.content.contains("<style>"));
        assert_eq!(html.filename, "Tom-Jerry.html");
    }

    #[test]
    fn render_is_deterministic() {
        let steps = [step("a", "b"), step("c", "")];
        for format in [ExportFormat::Html, ExportFormat::Markdown] {
            assert_eq!(render("n", &steps, format), render("n", &steps, format));
        }
    }

    #[test]
    fn escape_covers_all_reserved_characters() {
        assert_eq!(escape_html(r#"&<>"'"#), "&amp;&lt;&gt;&quot;&#039;");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn export_writes_rendered_guide_through_file_system() {
        let dir = tempdir().expect("dir");
        let ledger = StepLedger::open(dir.path().join("guide.sqlite")).expect("ledger");
        ledger.append(step("First", "")).expect("append");

        let fs = FakeFileSystem::default();
        let rendered = export_guide(
            &ledger,
            &fs,
            Path::new("/out"),
            "My Guide",
            ExportFormat::Markdown,
        )
        .expect("export");
        assert_eq!(rendered.filename, "My-Guide.md");
        assert_eq!(fs.file("/out/My-Guide.md"), Some(rendered.content));
    }

    #[test]
    fn export_surfaces_write_failures() {
        let dir = tempdir().expect("dir");
        let ledger = StepLedger::open(dir.path().join("guide.sqlite")).expect("ledger");
        let fs = FakeFileSystem::default();
        fs.set_fail_next(GuideError::Io("disk full".to_string()));
        let err = export_guide(&ledger, &fs, Path::new("/out"), "x", ExportFormat::Html)
            .expect_err("write fails");
        assert!(matches!(err, GuideError::Io(msg) if msg == "disk full"));
    }
}
