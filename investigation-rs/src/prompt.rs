// investigation-rs/src/prompt.rs
// Builds the planner prompt for one finding.

use std::fmt::Write;

use shared_types::Finding;

const GOALS: &str = "You are investigating a finding raised by the infrastructure patrol. Your goal is to:
1. Understand the issue using available tools
2. Determine if it can be automatically fixed
3. If fixable, propose a specific remediation command
";

const STORAGE_GUIDANCE: &str = "
## Storage Verification
- Confirm the storage is actually required by the affected workload before proposing a fix.
- Verify storage scope (node membership) and guest mounts or data paths using available tools.
- If dependency cannot be confirmed, respond with NEEDS_ATTENTION and state what evidence is missing.
";

const STEPS_AND_FORMAT: &str = "
## Investigation Steps
1. Use monitoring tools to gather current state of the resource
2. Analyze the root cause of the issue
3. Determine if automatic remediation is possible
4. If a fix is possible, provide a SPECIFIC command that can be executed

## Response Format
After your investigation, provide a summary in this exact format:

### Investigation Summary
[Brief summary of what you found]

### Root Cause
[Explanation of the root cause]

### Recommendation
[What should be done - be specific]

### Proposed Fix
If you have a specific command that can fix this issue, provide it as:
PROPOSED_FIX: <command>
TARGET_HOST: <hostname or \"local\">

If the issue cannot be automatically fixed, explain why:
CANNOT_FIX: <reason>

If the issue needs human attention, state:
NEEDS_ATTENTION: <reason>

Remember:
- Be thorough but efficient (you have limited turns)
- Only propose commands you're confident will help
- Never propose destructive commands (they'll be blocked anyway)
- Focus on the specific resource mentioned in the finding";

/// Renders the investigation prompt. `infra_context` describes where
/// services run and how to reach them; it is omitted when empty.
pub fn build_investigation_prompt(finding: &Finding, infra_context: Option<&str>) -> String {
    let mut prompt = String::from(GOALS);

    if let Some(context) = infra_context.map(str::trim).filter(|c| !c.is_empty()) {
        let _ = write!(
            prompt,
            "\n{context}\n**IMPORTANT**: When proposing commands, use the CLI access method shown above.
- If a service runs in a container, use 'docker exec <container> <command>' instead of direct commands
- Commands must execute in the environment where the service actually runs.
"
        );
    }

    if finding.resource_type.eq_ignore_ascii_case("storage") {
        prompt.push_str(STORAGE_GUIDANCE);
    }

    let _ = write!(
        prompt,
        "
## Finding Details
- **Title**: {}
- **Severity**: {}
- **Category**: {}
- **Resource**: {} ({}, type: {})
- **Description**: {}
",
        finding.title,
        finding.severity,
        finding.category,
        finding.resource_name,
        finding.resource_id,
        finding.resource_type,
        finding.description,
    );
    if !finding.evidence.is_empty() {
        let _ = writeln!(prompt, "- **Evidence**: {}", finding.evidence);
    }
    if !finding.recommendation.is_empty() {
        let _ = writeln!(prompt, "- **Recommendation**: {}", finding.recommendation);
    }

    prompt.push_str(STEPS_AND_FORMAT);
    prompt
}
