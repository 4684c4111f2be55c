//! Plan Extractor: coordinator text → [`ExecutionPlan`].
//!
//! The coordinator answers in a loose line format:
//!
//! ```text
//! COMPLEXITY: COMPLEX
//! EXECUTION: HYBRID
//! PHASES:
//! PHASE 1 (SEQUENTIAL):
//! - Agent 1: [Scout] - list the files in ./reports
//! PHASE 2 (PARALLEL):
//! - Agent 2: [Summarizer] - summarize each report
//! ```
//!
//! Each line is classified into a [`PlanLine`] first; the plan is then
//! assembled from the tags. Anything unrecognized contributes nothing, and
//! an incomplete plan degrades to a simpler one instead of failing:
//! no complexity marker → simple; HYBRID without phases → SEQUENTIAL;
//! complex without tasks → simple.
//!
//! A JSON plan (`{"complex":true,"mode":"parallel","tasks":[...]}`) is
//! accepted when the text carries no complexity marker at all.

use serde::Deserialize;

use super::errors::AgentError;
use super::types::{AgentTask, ExecutionMode, ExecutionPlan, Phase};

const COMPLEXITY_PREFIX: &str = "COMPLEXITY:";
const EXECUTION_PREFIX: &str = "EXECUTION:";
const PHASES_MARKER: &str = "PHASES:";
const PHASE_PREFIX: &str = "PHASE";
const AGENT_PREFIX: &str = "AGENT";

// ─── Line Classification ────────────────────────────────────────────────────

/// Tag for one line of coordinator output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanLine {
    /// `COMPLEXITY: COMPLEX` (true) or any other complexity value (false).
    Complexity(bool),
    /// `EXECUTION: <MODE>`.
    Mode(ExecutionMode),
    /// `PHASES:`
    PhasesStart,
    /// `PHASE n (MODE):`
    PhaseHeader(ExecutionMode),
    /// `- Agent n: [role] - instructions`
    Task(AgentTask),
    Other,
}

/// Classify one line. Markers match case-insensitively and may carry
/// markdown decoration (`**`, `#`).
pub fn classify_line(line: &str) -> PlanLine {
    let trimmed = line.trim();
    if let Some(task) = parse_task_line(trimmed) {
        return PlanLine::Task(task);
    }

    let bare = trimmed
        .trim_matches(|c: char| c == '*' || c == '#' || c == '_')
        .trim();
    let upper = bare.to_uppercase();

    if let Some(idx) = upper.find(COMPLEXITY_PREFIX) {
        let value = &upper[idx + COMPLEXITY_PREFIX.len()..];
        return PlanLine::Complexity(first_word(value) == "COMPLEX");
    }

    if let Some(idx) = upper.find(EXECUTION_PREFIX) {
        let value = &upper[idx + EXECUTION_PREFIX.len()..];
        return match mode_in(value) {
            Some(mode) => PlanLine::Mode(mode),
            None => PlanLine::Other,
        };
    }

    if upper.starts_with(PHASES_MARKER) {
        return PlanLine::PhasesStart;
    }

    if let Some(rest) = upper.strip_prefix(PHASE_PREFIX) {
        if rest.starts_with(|c: char| c.is_whitespace() || c.is_ascii_digit()) {
            if let Some(mode) = phase_header_mode(rest) {
                return PlanLine::PhaseHeader(mode);
            }
        }
    }

    PlanLine::Other
}

/// First word of a marker value, without markdown or punctuation around it.
fn first_word(value: &str) -> &str {
    value
        .trim_start_matches(|c: char| c == ':' || c == '*' || c == '_' || c == '(' || c.is_whitespace())
        .split(|c: char| !c.is_alphanumeric())
        .next()
        .unwrap_or("")
}

/// First mode keyword in `text`, by position.
fn mode_in(text: &str) -> Option<ExecutionMode> {
    [
        ("PARALLEL", ExecutionMode::Parallel),
        ("SEQUENTIAL", ExecutionMode::Sequential),
        ("HYBRID", ExecutionMode::Hybrid),
    ]
    .into_iter()
    .filter_map(|(kw, mode)| text.find(kw).map(|pos| (pos, mode)))
    .min_by_key(|(pos, _)| *pos)
    .map(|(_, mode)| mode)
}

/// Mode inside `n (MODE):`. A phase is internally parallel or sequential;
/// anything else runs sequentially.
fn phase_header_mode(rest: &str) -> Option<ExecutionMode> {
    let open = rest.find('(')?;
    let close = open + rest[open..].find(')')?;
    let number = rest[..open].trim();
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match mode_in(&rest[open + 1..close]) {
        Some(ExecutionMode::Parallel) => Some(ExecutionMode::Parallel),
        _ => Some(ExecutionMode::Sequential),
    }
}

/// Parse `- Agent N: [role] - instructions`.
///
/// The bullet may be `-`, `*` or `•`. Without brackets the role runs up to
/// the first ` - `. Lines without instructions are rejected.
fn parse_task_line(line: &str) -> Option<AgentTask> {
    let rest = line
        .strip_prefix('-')
        .or_else(|| line.strip_prefix('*'))
        .or_else(|| line.strip_prefix('•'))?
        .trim_start()
        .trim_start_matches("**");

    let head = rest.get(..AGENT_PREFIX.len())?;
    if !head.eq_ignore_ascii_case(AGENT_PREFIX) {
        return None;
    }
    let rest = rest[AGENT_PREFIX.len()..].trim_start();

    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = rest[digits..].trim_start_matches("**");
    let rest = rest.strip_prefix(':')?.trim_start_matches("**").trim();

    let (role, instructions) = if let Some(inner) = rest.strip_prefix('[') {
        let close = inner.find(']')?;
        (&inner[..close], &inner[close + 1..])
    } else {
        let sep = rest.find(" - ")?;
        (&rest[..sep], &rest[sep..])
    };

    let role = role.trim();
    let instructions = instructions
        .trim_start()
        .trim_start_matches(['-', ':', '–', '—'])
        .trim();

    if role.is_empty() || instructions.is_empty() {
        return None;
    }
    Some(AgentTask::new(role, instructions))
}

// ─── Plan Assembly ──────────────────────────────────────────────────────────

/// Extract a plan from the coordinator's final text. Never fails.
pub fn extract_plan(text: &str) -> ExecutionPlan {
    let mut complex: Option<bool> = None;
    let mut mode: Option<ExecutionMode> = None;
    let mut in_phases = false;
    let mut tasks: Vec<AgentTask> = Vec::new();
    let mut phases: Vec<Phase> = Vec::new();

    for line in text.lines() {
        match classify_line(line) {
            PlanLine::Complexity(c) => {
                complex.get_or_insert(c);
            }
            PlanLine::Mode(m) => {
                mode.get_or_insert(m);
            }
            PlanLine::PhasesStart => in_phases = true,
            PlanLine::PhaseHeader(m) if in_phases => phases.push(Phase {
                mode: m,
                tasks: Vec::new(),
            }),
            PlanLine::Task(task) => match phases.last_mut() {
                Some(phase) => phase.tasks.push(task),
                None => tasks.push(task),
            },
            PlanLine::PhaseHeader(_) | PlanLine::Other => {}
        }
    }

    match complex {
        Some(true) => assemble(mode.unwrap_or_default(), tasks, phases),
        Some(false) => ExecutionPlan::simple(),
        None => match parse_json_plan(text) {
            Ok(plan) => plan,
            Err(_) => ExecutionPlan::simple(),
        },
    }
}

/// Build a complex plan, degrading when pieces are missing.
fn assemble(mode: ExecutionMode, flat: Vec<AgentTask>, phases: Vec<Phase>) -> ExecutionPlan {
    let phases: Vec<Phase> = phases.into_iter().filter(|p| !p.tasks.is_empty()).collect();

    let plan = match mode {
        ExecutionMode::Hybrid if !phases.is_empty() => {
            if !flat.is_empty() {
                tracing::warn!(
                    dropped = flat.len(),
                    "tasks outside any phase ignored in hybrid plan"
                );
            }
            ExecutionPlan::hybrid(phases)
        }
        ExecutionMode::Hybrid => {
            tracing::info!("hybrid plan without phases, running tasks sequentially");
            ExecutionPlan::flat(ExecutionMode::Sequential, flat)
        }
        flat_mode => {
            let all: Vec<AgentTask> = flat
                .into_iter()
                .chain(phases.into_iter().flat_map(|p| p.tasks))
                .collect();
            ExecutionPlan::flat(flat_mode, all)
        }
    };

    if plan.task_count() == 0 {
        tracing::info!("complex plan without tasks, routing as simple");
        return ExecutionPlan::simple();
    }
    plan
}

// ─── JSON Fallback ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct JsonPlan {
    complex: bool,
    #[serde(default)]
    mode: ExecutionMode,
    #[serde(default)]
    tasks: Vec<AgentTask>,
    #[serde(default)]
    phases: Vec<Phase>,
}

/// Parse a JSON plan, possibly wrapped in prose or code fences.
pub fn parse_json_plan(text: &str) -> Result<ExecutionPlan, AgentError> {
    let json_str = extract_json(text).ok_or_else(|| AgentError::InvalidPlan {
        reason: "no JSON object found".into(),
    })?;
    let raw: JsonPlan = serde_json::from_str(json_str).map_err(|e| AgentError::InvalidPlan {
        reason: format!("failed to parse plan JSON: {e}"),
    })?;

    if !raw.complex {
        return Ok(ExecutionPlan::simple());
    }

    let phases = raw
        .phases
        .into_iter()
        .map(|p| Phase {
            mode: match p.mode {
                ExecutionMode::Parallel => ExecutionMode::Parallel,
                _ => ExecutionMode::Sequential,
            },
            tasks: p.tasks,
        })
        .collect();
    Ok(assemble(raw.mode, raw.tasks, phases))
}

/// Slice from the first `{` to the last `}`.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

// ─── Tests ──────────────────────────────────────────────────────────────────
