use crate::event::MessageChunk;
use crate::frame::Usage;
use serde::{Deserialize, Serialize};

/// Source of the token counts written into finish frames.
///
/// Implementations see every chunk from a surfaced node before that chunk is
/// classified, so a finish frame reflects usage reported on the same chunk.
pub trait UsageMeter: Send {
    /// Records whatever usage `chunk` reports.
    fn observe(&mut self, chunk: &MessageChunk);

    /// The usage to report right now.
    fn current(&self) -> Usage;
}

/// Always reports zero usage.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderUsage;

impl UsageMeter for PlaceholderUsage {
    fn observe(&mut self, _chunk: &MessageChunk) {}

    fn current(&self) -> Usage {
        Usage::default()
    }
}

/// Sums the usage that model chunks report in-band.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportedUsage {
    total: Usage,
}

impl UsageMeter for ReportedUsage {
    fn observe(&mut self, chunk: &MessageChunk) {
        if let Some(reported) = chunk.usage_metadata {
            self.total.prompt_tokens =
                self.total.prompt_tokens.saturating_add(reported.input_tokens);
            self.total.completion_tokens =
                self.total.completion_tokens.saturating_add(reported.output_tokens);
        }
    }

    fn current(&self) -> Usage {
        self.total
    }
}

/// Which [`UsageMeter`] a translator starts with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageSource {
    /// [`PlaceholderUsage`].
    #[default]
    Placeholder,
    /// [`ReportedUsage`].
    Reported,
}

impl UsageSource {
    /// A fresh meter for one translation.
    pub fn meter(self) -> Box<dyn UsageMeter> {
        match self {
            UsageSource::Placeholder => Box::new(PlaceholderUsage),
            UsageSource::Reported => Box::<ReportedUsage>::default(),
        }
    }
}
