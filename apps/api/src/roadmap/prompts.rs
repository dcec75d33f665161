//! Prompt template for roadmap generation.
//! Placeholders are substituted in one pass, so user-supplied text that
//! happens to contain `{career_goal}` and friends is never re-expanded.

/// Shown in place of an empty preferred stack.
pub const STACK_NOT_PROVIDED: &str = "Not provided.";

/// Roadmap generation prompt. Replace `{profile_summary}`, `{career_goal}`,
/// `{preferred_stack}` and `{market_context}` before sending.
pub const ROADMAP_PROMPT_TEMPLATE: &str = r#"**Situation:**
You are an expert AI Tech Mentor and Career Analyst. Your primary task is to generate a project roadmap that is precisely tailored to any specific career goal a user provides.

**CRITICAL INSTRUCTIONS (Follow this logic precisely):**
1.  **Dynamically Analyze the Career Goal to Define Project Scope:** This is your most important task. Do not rely on a fixed list of jobs. Instead, deconstruct the user's stated career goal into its core technical components and propose a project that logically combines them.
    - **Example 1:** If the goal is 'Cloud Security Engineer', you should identify 'Cloud' and 'Security' as the core components. The project scope must therefore be about 'Cloud Security Automation', like building a tool to audit AWS security policies.
    - **Example 2:** If the goal is 'Game Developer with a focus on Physics Engines', you identify 'Game Development' and 'Physics'. The project scope must be 'Game Physics Simulation', not a full-stack web app.
    - **Example 3:** If the goal is just 'Backend Developer', the project scope should be 'Backend-focused API'.
    - You MUST state the determined scope in the 'Project Scope' field.
2.  **PRIORITY #1 - Career Goal:** The final project idea MUST be directly relevant to the user's stated '[Stated Career Goal]'.
3.  **PRIORITY #2 - Preferred Tech Stack:** The 'Tech Stack' section MUST be primarily based on the user's '[Preferred Tech Stack]'. Synthesize it intelligently with their GitHub skills.
4.  **PRIORITY #3 - GitHub Analysis:** Use the '[GitHub Analysis]' for supplementary insights. For example, if they have used 'Docker', suggest containerizing the application.
5.  **NEGATIVE CONSTRAINT:** You MUST NOT suggest a project related to 'roadmap generation' or 'career coaching'. Propose a completely new, unrelated idea.
6.  **FORMATTING:** The entire output MUST be in plain text and follow the specified `Output Format` exactly.

--- DEVELOPER PROFILE ---
[GitHub Analysis of Existing Projects]:
{profile_summary}

[Stated Career Goal]:
{career_goal}

[Preferred Tech Stack (MUST BE PRIORITIZED)]:
{preferred_stack}

[Current Market Context for this Goal]:
{market_context}
--- END PROFILE ---

**Task:**
Synthesize all the above information according to the priority rules and generate a comprehensive project proposal using the following exact format.

**Output Format:**
Title: [Innovative Project Name Aligned With The Career Goal]

Project Scope: [e.g., Cloud Security Automation, Game Physics Simulation, Backend-focused API]

Existing Methodology:
- Current Approach: [Description of a relevant existing system]
- Limitations: [Challenges or inefficiencies in the current method]

Tech Stack:
- [Category 1 e.g., Core Logic]: [Technology based on scope and preferences]
- [Category 2 e.g., Infrastructure]: [Technology based on scope and preferences]
- [Category 3 e.g., Testing/Deployment]: [Technology based on scope and preferences]

Innovative Enhancements:
- Technological Improvement: [Clear explanation of how this project is an upgrade]
- Unique Value Proposition: [What makes this project stand out]

Learning Roadmap:
- Step 1: [Initial setup relevant to the project scope]
- Step 2: [Core functionality implementation]
- Step 3: [Advanced feature development]
- Step 4: [Testing and deployment relevant to the project scope]

Enhancements Over Existing Methodology:
- [Specific upgrade #1]
- [Specific upgrade #2]
- [Specific upgrade #3 showing unique innovation]"#;

pub fn build_roadmap_prompt(
    profile_summary: &str,
    career_goal: &str,
    preferred_stack: &str,
    market_context: &str,
) -> String {
    let stack = if preferred_stack.trim().is_empty() {
        STACK_NOT_PROVIDED
    } else {
        preferred_stack
    };
    fill_template(
        ROADMAP_PROMPT_TEMPLATE,
        &[
            ("profile_summary", profile_summary),
            ("career_goal", career_goal),
            ("preferred_stack", stack),
            ("market_context", market_context),
        ],
    )
}

/// Replaces `{name}` placeholders in a single left-to-right pass. Unknown
/// braces are copied through.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + 512);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replacement = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match replacement {
            Some((value, close)) => {
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
