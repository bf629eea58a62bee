//! Prompt text for the keyword and synthesis completions.

use std::path::Path;

use serde_json::json;

use hottake_shared::{ContentRecord, HotTakeError, OutputMode, PageData, Result};

const SOURCE_URL: &str = "{source_url}";
const PAGE: &str = "{page}";
const CONTENTS: &str = "{contents}";

/// Prompt asking for at most `max_keywords` search keywords for `page`.
pub fn keyword_prompt(page: &PageData, max_keywords: usize) -> String {
    format!(
        "Extract the keywords from the following web page with the most potential to spread, \
following these rules:\n\
1. Focus on the core conflict or highlight of the content\n\
2. Prefer words that are topical and controversial\n\
3. Prefer trending internet terms or words tied to current events\n\
4. Output at most {max_keywords} keywords\n\
5. Output format:\n\
{{\n  \"keywords\": string[]\n}}\n\n\
Page content: {page}\n\
Return valid JSON only, with nothing else.",
        page = page_json(page),
    )
}

fn page_json(page: &PageData) -> String {
    json!({
        "title": page.title,
        "description": page.description,
        "content": page.body_text,
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// Synthesis template
// ---------------------------------------------------------------------------

const TEXT_TEMPLATE: &str = "\
Write an event analysis report for the games/ACG field based on the web content below. \
Classify the event using the following format:

News source:
{source_url}

1. [Event title] Describe the essence of the event logically, in the form \
\"subject A, during event B, did C, which led to D\".
2. [First emotional read] Using plain emotional adjectives, describe the surface-level \
reaction to the event from positive, negative and neutral angles.
3. [Category] Pick one label for the event, such as: blockbuster gameplay, blockbuster \
story, indie game, niche game, major player-community event, niche player-community \
event, major social event, niche social event. You may define a new label in the same spirit.
4. [Potential audience] Who is most likely to care about this event and why \
(gender, age, interests, gaming experience), tied to the analysis above.
5. [Subjects] Analyse the subjects involved (people, organisations, products, events, \
games) with basic background for each. Cover at least 5 subjects.
6. [Idealised course of events] Identify the most influential subject and its goal, \
then derive how the event would unfold in the ideal case.
7. [Actual course of events] Identify the most influential subject and its goal, \
then derive how the event actually unfolded.
8. [Conflicts] Analyse at least 3 subject-vs-subject conflicts: the conflict, both \
sides, each side's mood, the focal point and how it gets resolved.
9. [Bystander view] Describe how a bystander's feelings shift while following the event.
10. [Opinions] Combining everything above, pick the conflict with the most traffic \
value and express the event in emotional, dramatic language. Give at least 3 opinions.

Extra notes: record any small details, fragments, background or jokes that may help \
the analysis but do not appear in the news.

[Original page content]:
{page}

[Extra content found through keyword search]:
{contents}

Reply in plain text, not JSON.";

const STRUCTURED_TEMPLATE: &str = "\
Analyse the event described by the web content below (news source: {source_url}).

[Original page content]:
{page}

[Extra content found through keyword search]:
{contents}

Reply with a single JSON object and nothing else, using this schema:
{
  \"title\": \"one-line essence of the event\",
  \"summary\": \"short neutral summary\",
  \"impression\": \"first emotional read, positive/negative/neutral\",
  \"entities\": [\"each subject involved, with one line of background\"],
  \"timeline\": [\"each step of how the event unfolded, in order\"],
  \"opinions\": [
    {\"type\": \"positive | negative | neutral\", \"content\": \"the opinion\", \"subpoints\": [\"supporting point\"]}
  ]
}";

/// Synthesis prompt template with `{source_url}`, `{page}` and `{contents}` slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisTemplate {
    source: String,
}

impl SynthesisTemplate {
    /// The built-in template for an output mode.
    pub fn builtin(mode: OutputMode) -> Self {
        let source = match mode {
            OutputMode::Text => TEXT_TEMPLATE,
            OutputMode::Structured => STRUCTURED_TEMPLATE,
        };
        Self {
            source: source.to_string(),
        }
    }

    /// A custom template. It must reference `{contents}`.
    pub fn custom(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        if !source.contains(CONTENTS) {
            return Err(HotTakeError::config(format!(
                "synthesis template must contain the {CONTENTS} placeholder"
            )));
        }
        Ok(Self { source })
    }

    /// Load a custom template from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| HotTakeError::io(path, e))?;
        Self::custom(source)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Fill the template for one run.
    pub fn render(&self, source_url: &str, page: &PageData, contents: &[ContentRecord]) -> String {
        let contents_json = json!(
            contents
                .iter()
                .map(|c| json!({ "keyword": c.keyword, "content": c.content_text }))
                .collect::<Vec<_>>()
        )
        .to_string();

        let page_json = page_json(page);
        let slots = [
            (SOURCE_URL, source_url),
            (PAGE, page_json.as_str()),
            (CONTENTS, contents_json.as_str()),
        ];

        // Single pass, so text inside a filled slot is never re-expanded.
        let mut out = String::with_capacity(self.source.len() + page_json.len() + contents_json.len());
        let mut rest = self.source.as_str();
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            match slots.iter().find(|(slot, _)| tail.starts_with(slot)) {
                Some((slot, value)) => {
                    out.push_str(value);
                    rest = &tail[slot.len()..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}
