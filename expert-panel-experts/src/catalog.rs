//! Expert catalog
//!
//! Static registry of the personas the coordinator can consult. Each entry
//! carries the system prompt used when the expert is invoked and the
//! function descriptor the coordinator sees.

use crate::descriptor::FunctionDescriptor;
use crate::error::UnknownExpertType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One expert persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertConfig {
    /// Catalog identifier, e.g. `psychologist`
    pub expert_type: String,
    /// Display name
    pub name: String,
    pub role: String,
    pub expertise: Vec<String>,
    pub system_prompt: String,
    pub response_style: String,
    pub function: FunctionDescriptor,
}

impl ExpertConfig {
    /// Build a persona whose system prompt asks for the structured reply
    /// format understood by [`crate::ExpertOpinion::parse`].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        expert_type: &str,
        name: &str,
        role: &str,
        background: &str,
        expertise: &[&str],
        perspective: &str,
        response_style: &str,
        function_name: &str,
    ) -> Self {
        let system_prompt = format!(
            "You are {background}.\n\
             Your areas of expertise: {expertise}.\n\
             Answer the user's question from the perspective of {perspective}, \
             giving professional and practical advice.\n\
             Reply format:\n\
             [Analysis]\n(your professional analysis)\n\n\
             [Key Points]\n- point 1\n- point 2\n- point 3\n\n\
             [Recommendations]\n- recommendation 1\n- recommendation 2\n- recommendation 3",
            expertise = expertise.join(", "),
        );

        Self {
            expert_type: expert_type.to_string(),
            name: name.to_string(),
            role: role.to_string(),
            expertise: expertise.iter().map(|s| s.to_string()).collect(),
            system_prompt,
            response_style: response_style.to_string(),
            function: FunctionDescriptor::with_query(function_name, format!("Consult the {}", name)),
        }
    }
}

fn builtin_experts() -> Vec<ExpertConfig> {
    vec![
        ExpertConfig::new(
            "planner",
            "Recruitment Planner",
            "Senior campaign strategist",
            "a senior enrollment planner with over ten years of kindergarten recruitment experience",
            &[
                "event concept design",
                "brand promotion",
                "marketing plans",
                "family experience design",
            ],
            "enrollment and campaign planning",
            "professional, practical, structured",
            "consult_recruitment_planner",
        ),
        ExpertConfig::new(
            "psychologist",
            "Child Psychologist",
            "Child psychologist",
            "a child psychologist specialising in the development of children aged three to six",
            &[
                "child behaviour analysis",
                "parent needs insight",
                "parent-child relationships",
                "educational psychology",
            ],
            "developmental psychology",
            "scientific, grounded, theory joined with practice",
            "consult_psychologist",
        ),
        ExpertConfig::new(
            "investor",
            "Investment Analyst",
            "Financial advisor",
            "an investment analyst focused on budgeting and returns in the education sector",
            &[
                "cost-benefit analysis",
                "return on investment",
                "budget planning",
                "risk control",
                "data-driven decisions",
            ],
            "finance and investment, quantifying wherever possible",
            "quantitative, practical, data-driven",
            "consult_investor",
        ),
        ExpertConfig::new(
            "director",
            "Kindergarten Director",
            "Operations director",
            "a kindergarten director with over fifteen years of school management experience",
            &[
                "team management",
                "resource allocation",
                "process improvement",
                "quality control",
                "crisis handling",
            ],
            "school operations, with systematic and actionable steps",
            "systematic, actionable, management-oriented",
            "consult_director",
        ),
        ExpertConfig::new(
            "teacher",
            "Lead Teacher",
            "Classroom teacher",
            "a lead kindergarten teacher with over eight years of classroom experience",
            &[
                "curriculum design",
                "classroom delivery",
                "parent communication",
                "classroom management",
                "activity organisation",
            ],
            "day-to-day teaching practice",
            "hands-on, actionable, teaching-oriented",
            "consult_teacher",
        ),
        ExpertConfig::new(
            "parent",
            "Parent Representative",
            "Voice of the families",
            "an experienced parent representative who also works on service experience",
            &[
                "family needs analysis",
                "service experience",
                "satisfaction",
                "word of mouth",
                "family relationships",
            ],
            "parents and families as the users of the service",
            "empathetic, practical, family-oriented",
            "consult_parent_representative",
        ),
    ]
}

/// Ordered, immutable set of experts with lookup by type and function name
#[derive(Debug, Clone)]
pub struct ExpertCatalog {
    experts: Vec<ExpertConfig>,
    by_type: HashMap<String, usize>,
    by_function: HashMap<String, usize>,
}

impl ExpertCatalog {
    /// Build a catalog; later entries win on duplicate identifiers
    pub fn new(experts: Vec<ExpertConfig>) -> Self {
        let mut by_type = HashMap::new();
        let mut by_function = HashMap::new();
        for (index, expert) in experts.iter().enumerate() {
            by_type.insert(expert.expert_type.clone(), index);
            by_function.insert(expert.function.name.clone(), index);
        }
        Self {
            experts,
            by_type,
            by_function,
        }
    }

    /// The six built-in kindergarten personas
    pub fn builtin() -> Self {
        Self::new(builtin_experts())
    }

    pub fn get(&self, expert_type: &str) -> Option<&ExpertConfig> {
        self.by_type.get(expert_type).map(|&i| &self.experts[i])
    }

    pub fn require(&self, expert_type: &str) -> Result<&ExpertConfig, UnknownExpertType> {
        self.get(expert_type)
            .ok_or_else(|| UnknownExpertType(expert_type.to_string()))
    }

    /// Map a coordinator function name to its expert
    pub fn resolve_function(&self, function_name: &str) -> Option<&ExpertConfig> {
        self.by_function
            .get(function_name)
            .map(|&i| &self.experts[i])
    }

    /// Function definitions in OpenAI `tools` format, catalog order
    pub fn function_definitions(&self) -> Vec<Value> {
        self.experts.iter().map(|e| e.function.to_schema()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExpertConfig> {
        self.experts.iter()
    }

    pub fn len(&self) -> usize {
        self.experts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experts.is_empty()
    }
}

impl Default for ExpertCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
