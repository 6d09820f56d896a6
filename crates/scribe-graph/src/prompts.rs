use scribe_core::{ScribeError, ScribeResult};
use std::path::Path;
use tracing::info;

const PLANNER_TEMPLATE: &str = "\
You are a research planner. The user wants a short report about the topic below.
Break the topic down into between 2 and 5 concrete web search queries that
together cover it well.

Respond with a single JSON object of the form {\"subjects\": [\"query\", ...]}
and nothing else.

Topic: {topic}";

const REPORTER_TEMPLATE: &str = "\
You are a research reporter. Write a concise, well-structured markdown report
about the topic below, using only the search results provided. Cite sources
inline as markdown links.

When the results contain numbers that compare well side by side, call the
render_bar_chart_component tool to show them as a bar chart, then mention the
chart in the report.

Topic: {topic}

Search results (JSON):
{search_results}";

/// System prompt templates for the graph's model nodes.
///
/// Templates use `{name}` placeholders, filled by [`Prompts::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    /// System prompt of the planner node.
    pub planner: String,
    /// System prompt of the reporter node.
    pub reporter: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            planner: PLANNER_TEMPLATE.to_string(),
            reporter: REPORTER_TEMPLATE.to_string(),
        }
    }
}

impl Prompts {
    /// Built-in templates, overridden by `planner.md` / `reporter.md` in
    /// `dir` when those files exist.
    pub async fn load(dir: Option<&Path>) -> ScribeResult<Self> {
        let mut prompts = Self::default();
        let Some(dir) = dir else {
            return Ok(prompts);
        };
        if !dir.is_dir() {
            return Err(ScribeError::Config(format!(
                "prompts directory {} does not exist",
                dir.display()
            )));
        }

        for (file, slot) in [
            ("planner.md", &mut prompts.planner),
            ("reporter.md", &mut prompts.reporter),
        ] {
            let path = dir.join(file);
            if path.is_file() {
                *slot = tokio::fs::read_to_string(&path).await?;
                info!(path = %path.display(), "Loaded prompt override");
            }
        }
        Ok(prompts)
    }

    /// Replaces each `{key}` in `template` with its value, in one pass.
    ///
    /// Substituted values are never scanned again, and braces that do not
    /// name a known key are kept as written.
    pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let found = after.find('}').and_then(|close| {
                let key = &after[..close];
                vars.iter()
                    .find(|(name, _)| *name == key)
                    .map(|(_, value)| (close, *value))
            });
            match found {
                Some((close, value)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}
