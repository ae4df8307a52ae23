use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TemplateStep {
    pub kind: String,
    pub title: String,
}

impl TemplateStep {
    fn new(kind: &str, title: &str) -> Self {
        Self {
            kind: kind.to_string(),
            title: title.to_string(),
        }
    }
}

/// Proposal kind to the ordered steps a mission of that kind runs.
#[derive(Debug, Clone)]
pub struct StepTemplates {
    templates: HashMap<String, Vec<TemplateStep>>,
}

impl Default for StepTemplates {
    fn default() -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            "analysis".to_string(),
            vec![TemplateStep::new("analyze", "Run analysis")],
        );
        templates.insert(
            "content".to_string(),
            vec![
                TemplateStep::new("analyze", "Research topic"),
                TemplateStep::new("generate", "Generate content"),
                TemplateStep::new("review", "Review content"),
            ],
        );
        templates.insert(
            "research".to_string(),
            vec![TemplateStep::new("analyze", "Deep research")],
        );
        templates.insert(
            "deploy".to_string(),
            vec![
                TemplateStep::new("analyze", "Pre-deploy checks"),
                TemplateStep::new("review", "Deploy review"),
                TemplateStep::new("publish", "Execute deploy"),
            ],
        );
        Self { templates }
    }
}

impl StepTemplates {
    /// Built-in templates with `overrides` layered on top, kind by kind.
    pub fn with_overrides<'a, I>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a Vec<TemplateStep>)>,
    {
        let mut templates = Self::default();
        for (kind, steps) in overrides {
            templates.register(kind, steps.clone());
        }
        templates
    }

    pub fn register(&mut self, kind: &str, steps: Vec<TemplateStep>) {
        self.templates.insert(kind.to_string(), steps);
    }

    pub fn get(&self, kind: &str) -> Option<&[TemplateStep]> {
        self.templates.get(kind).map(Vec::as_slice)
    }

    /// Steps for a proposal. Unknown kinds (and kinds registered with an
    /// empty list) run as a single step named after the proposal itself.
    pub fn steps_for(&self, kind: &str, title: &str) -> Vec<TemplateStep> {
        match self.get(kind) {
            Some(steps) if !steps.is_empty() => steps.to_vec(),
            _ => vec![TemplateStep::new(kind, title)],
        }
    }
}

/// Prompt preamble per step kind.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    roles: HashMap<String, String>,
    fallback: String,
}

impl Default for RoleRegistry {
    fn default() -> Self {
        let roles = [
            ("analyze", "You are an analysis agent."),
            ("generate", "You are a content generation agent."),
            ("review", "You are a meticulous reviewer."),
            ("publish", "You are a release agent."),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            roles,
            fallback: "You are a helpful operations agent.".to_string(),
        }
    }
}

impl RoleRegistry {
    pub fn preamble(&self, step_kind: &str) -> &str {
        self.roles
            .get(step_kind)
            .map(String::as_str)
            .unwrap_or(&self.fallback)
    }

    pub fn build_prompt(&self, step_kind: &str, title: &str, input: &serde_json::Value) -> String {
        let proposal_kind = input
            .get("kind")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(step_kind);
        format!(
            "{} Perform the following task:\n\nTask: {}\nKind: {}\nContext: {}\n\nBe concise but complete.",
            self.preamble(step_kind),
            title,
            proposal_kind,
            input
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_kind_falls_back_to_single_step() {
        let t = StepTemplates::default();
        let steps = t.steps_for("tweet", "Post launch tweet");
        assert_eq!(steps, vec![TemplateStep::new("tweet", "Post launch tweet")]);
    }

    #[test]
    fn registered_kind_replaces_builtin() {
        let mut t = StepTemplates::default();
        t.register("research", vec![TemplateStep::new("analyze", "a"), TemplateStep::new("review", "b")]);
        assert_eq!(t.steps_for("research", "x").len(), 2);
        t.register("empty", Vec::new());
        assert_eq!(t.steps_for("empty", "x")[0].kind, "empty");
    }

    #[test]
    fn prompt_uses_role_and_context() {
        let roles = RoleRegistry::default();
        let prompt = roles.build_prompt("review", "Deploy review", &json!({"kind": "deploy"}));
        assert!(prompt.starts_with("You are a meticulous reviewer."));
        assert!(prompt.contains("Task: Deploy review"));
        assert!(prompt.contains("Kind: deploy"));
        assert!(roles.preamble("dance").contains("operations agent"));
    }
}
