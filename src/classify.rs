//! Ordered keyword classifier mapping episode text to a category label.
//!
//! The rule list is an explicit priority list: rules are evaluated
//! top-to-bottom and the first rule with any keyword hit wins. Reordering
//! rules changes classification outcomes and is a behavioral change, not a
//! refactor.

/// One classification rule: a label and the keywords (OR semantics) that
/// select it.
#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub label: String,
    pub keywords: Vec<String>,
}

impl CategoryRule {
    pub fn new(label: &str, keywords: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Deterministic, pure classifier. Rules are injected at construction so
/// tests can use custom tables; there is no ambient global rule state.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<CategoryRule>,
}

impl Classifier {
    /// Keywords are lowercased once here; `classify` only lowercases the
    /// input text.
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| CategoryRule {
                label: rule.label,
                keywords: rule.keywords.into_iter().map(|kw| kw.to_lowercase()).collect(),
            })
            .collect();
        Self { rules }
    }

    /// Case-insensitive substring matching over `text`; falls back to
    /// `default_label` when no rule matches. Total: always returns a label.
    pub fn classify(&self, text: &str, default_label: &str) -> String {
        let lower = text.to_lowercase();
        for rule in &self.rules {
            if rule.keywords.iter().any(|kw| lower.contains(kw.as_str())) {
                return rule.label.clone();
            }
        }
        default_label.to_string()
    }

    /// The stock AI-company pattern table, checked in priority order.
    pub fn default_rules() -> Vec<CategoryRule> {
        vec![
            CategoryRule::new(
                "Anthropic",
                &["anthropic", "claude", "dario amodei", "amanda askell", "chris olah"],
            ),
            CategoryRule::new(
                "OpenAI",
                &[
                    "openai", "chatgpt", "gpt-4", "gpt-5", "gpt4", "sam altman",
                    "greg brockman", "ilya sutskever", "sora", "o1", "o3",
                ],
            ),
            CategoryRule::new(
                "Google DeepMind",
                &[
                    "google", "deepmind", "gemini", "jeff dean", "sundar pichai",
                    "demis hassabis", "noam shazeer",
                ],
            ),
            CategoryRule::new("Meta AI", &["meta ai", "llama", "mark zuckerberg", "yann lecun"]),
            CategoryRule::new("xAI", &["xai", "grok", "elon musk"]),
            CategoryRule::new(
                "Microsoft",
                &["microsoft", "github copilot", "satya nadella", "copilot"],
            ),
            CategoryRule::new("NVIDIA", &["nvidia", "jensen huang", "cuda"]),
            CategoryRule::new("Mistral", &["mistral"]),
            CategoryRule::new("Cohere", &["cohere"]),
            CategoryRule::new("Stability AI", &["stability ai", "stable diffusion"]),
        ]
    }
}
