//! `folio replay` - run a scripted editing session
//!
//! The script seeds one page in the in-memory store, then applies a list of
//! steps. Elements are addressed by their index in the visible list (bottom
//! to top) at the time the step runs.
//!
//! ```json
//! {
//!   "seed": [{ "kind": "text", "position": { "x": 10, "y": 10 }, "size": { "width": 50, "height": 8 } }],
//!   "steps": [
//!     { "op": "select", "target": 0 },
//!     { "op": "copy" },
//!     { "op": "paste" },
//!     { "op": "save" }
//!   ]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use folio_editor::{
    EditingSession, Element, ElementId, ElementPatch, MemoryGateway, NewElement, Page,
    ReorderAction, SessionState,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::settings::AppConfig;

/// Edit script
#[derive(Debug, Deserialize)]
pub struct Script {
    /// Owning notebook; random when absent
    #[serde(default)]
    pub notebook_id: Option<Uuid>,
    #[serde(default = "default_page_number")]
    pub page_number: u32,
    /// Elements stored before the page is loaded
    #[serde(default)]
    pub seed: Vec<NewElement>,
    pub steps: Vec<Step>,
}

fn default_page_number() -> u32 {
    1
}

/// One scripted action
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Add { element: NewElement },
    Update { target: usize, patch: ElementPatch },
    Delete { target: usize },
    DeleteSelected,
    Reorder { target: usize, action: ReorderAction },
    Select { target: usize },
    ToggleSelect { target: usize },
    SelectAll,
    ClearSelection,
    Copy,
    Paste,
    Undo,
    Redo,
    Save,
    Reload,
    Duplicate { target: usize },
    /// Restore the n-th element deleted earlier in the script
    Restore { deleted: usize },
    /// Fail the next `count` store calls
    FailNext { count: usize },
    Offline { enabled: bool },
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::DeleteSelected => "delete_selected",
            Self::Reorder { .. } => "reorder",
            Self::Select { .. } => "select",
            Self::ToggleSelect { .. } => "toggle_select",
            Self::SelectAll => "select_all",
            Self::ClearSelection => "clear_selection",
            Self::Copy => "copy",
            Self::Paste => "paste",
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::Save => "save",
            Self::Reload => "reload",
            Self::Duplicate { .. } => "duplicate",
            Self::Restore { .. } => "restore",
            Self::FailNext { .. } => "fail_next",
            Self::Offline { .. } => "offline",
        }
    }
}

/// Result of one step
#[derive(Debug, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub op: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Final session state after a replay
#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub page: Page,
    pub state: SessionState,
    pub steps: Vec<StepOutcome>,
    pub elements: Vec<Element>,
    pub selection: Vec<ElementId>,
    pub pending_changes: usize,
    pub can_undo: bool,
    pub can_redo: bool,
    pub stored_elements: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

struct Replayer {
    session: EditingSession,
    gateway: MemoryGateway,
    page_id: Uuid,
    deleted: Vec<ElementId>,
}

impl Replayer {
    fn target(&self, index: usize) -> Result<ElementId> {
        self.session
            .elements()
            .get(index)
            .map(|e| e.id)
            .ok_or_else(|| anyhow!("no visible element at index {index}"))
    }

    async fn apply(&mut self, step: Step) -> Result<Option<String>> {
        let detail = match step {
            Step::Add { element } => Some(self.session.add_element(element)?.to_string()),
            Step::Update { target, patch } => {
                let id = self.target(target)?;
                self.session.update_element(id, patch)?;
                Some(id.to_string())
            }
            Step::Delete { target } => {
                let id = self.target(target)?;
                self.session.delete_element(id)?;
                self.deleted.push(id);
                Some(id.to_string())
            }
            Step::DeleteSelected => {
                let ids = self.session.selection().to_vec();
                let count = self.session.delete_selected()?;
                self.deleted.extend(ids);
                Some(format!("{count} deleted"))
            }
            Step::Reorder { target, action } => {
                let id = self.target(target)?;
                self.session.reorder(id, action)?;
                Some(id.to_string())
            }
            Step::Select { target } => {
                let id = self.target(target)?;
                self.session.select(id)?;
                None
            }
            Step::ToggleSelect { target } => {
                let id = self.target(target)?;
                let selected = self.session.toggle_select(id)?;
                Some(if selected { "selected" } else { "deselected" }.to_string())
            }
            Step::SelectAll => {
                self.session.select_all()?;
                Some(format!("{} selected", self.session.selection().len()))
            }
            Step::ClearSelection => {
                self.session.clear_selection();
                None
            }
            Step::Copy => Some(self.session.copy()?.to_string()),
            Step::Paste => self.session.paste()?.map(|id| id.to_string()),
            Step::Undo => Some(self.session.undo()?.to_string()),
            Step::Redo => Some(self.session.redo()?.to_string()),
            Step::Save => {
                let report = self.session.save().await?;
                for (old, new) in &report.remaps {
                    if let Some(pos) = self.deleted.iter().position(|id| id == old) {
                        self.deleted[pos] = *new;
                    }
                }
                Some(format!(
                    "{} created, {} updated, {} deleted",
                    report.created, report.updated, report.deleted
                ))
            }
            Step::Reload => {
                self.session.load(self.page_id).await?;
                None
            }
            Step::Duplicate { target } => {
                let id = self.target(target)?;
                Some(self.session.duplicate(id).await?.to_string())
            }
            Step::Restore { deleted } => {
                let id = *self
                    .deleted
                    .get(deleted)
                    .ok_or_else(|| anyhow!("no deleted element at index {deleted}"))?;
                Some(self.session.restore(id).await?.id.to_string())
            }
            Step::FailNext { count } => {
                self.gateway.fail_next(count);
                None
            }
            Step::Offline { enabled } => {
                self.gateway.set_offline(enabled);
                None
            }
        };
        Ok(detail)
    }

    fn report(self, steps: Vec<StepOutcome>) -> Result<ReplayReport> {
        let page = self
            .session
            .page()
            .cloned()
            .ok_or_else(|| anyhow!("session has no open page"))?;
        Ok(ReplayReport {
            page,
            state: self.session.state(),
            steps,
            elements: self.session.elements(),
            selection: self.session.selection().to_vec(),
            pending_changes: self.session.buffer().len(),
            can_undo: self.session.can_undo(),
            can_redo: self.session.can_redo(),
            stored_elements: self.gateway.stored_count(self.page_id),
            last_error: self.session.last_error().map(ToString::to_string),
        })
    }
}

/// Load a script from disk and replay it
pub async fn run(path: &Path, config: &AppConfig, strict: bool, compact: bool) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    let script: Script = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse script {}", path.display()))?;

    let report = replay(script, config, strict).await?;
    let output = if compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{output}");
    Ok(())
}

/// Replay a parsed script and report the final state
pub async fn replay(script: Script, config: &AppConfig, strict: bool) -> Result<ReplayReport> {
    let gateway =
        MemoryGateway::new().with_duplicate_offset(config.gateway.duplicate_offset_mm);
    let page = Page::new(
        script.notebook_id.unwrap_or_else(Uuid::new_v4),
        script.page_number,
    );
    let page_id = page.id;
    gateway.seed(page, script.seed);

    let mut session = EditingSession::with_config(Arc::new(gateway.clone()), config.editor.clone());
    session
        .load(page_id)
        .await
        .context("Failed to load seeded page")?;
    info!(page_id = %page_id, steps = script.steps.len(), "Replaying script");

    let mut replayer = Replayer {
        session,
        gateway,
        page_id,
        deleted: Vec::new(),
    };
    let mut outcomes = Vec::with_capacity(script.steps.len());

    for (index, step) in script.steps.into_iter().enumerate() {
        let op = step.name();
        match replayer.apply(step).await {
            Ok(detail) => outcomes.push(StepOutcome {
                index,
                op,
                ok: true,
                detail,
            }),
            Err(e) if strict => {
                return Err(e).with_context(|| format!("Step {index} ({op}) failed"));
            }
            Err(e) => {
                warn!(index, op, error = %e, "Step failed");
                outcomes.push(StepOutcome {
                    index,
                    op,
                    ok: false,
                    detail: Some(e.to_string()),
                });
            }
        }
    }

    replayer.report(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(json: &str) -> Script {
        serde_json::from_str(json).unwrap()
    }

    const SEEDED: &str = r#"{
        "seed": [
            { "kind": "text", "position": { "x": 10, "y": 10 }, "size": { "width": 50, "height": 8 } },
            { "kind": "emoji", "position": { "x": 30, "y": 40 }, "size": { "width": 12, "height": 12 } }
        ],
        "steps": []
    }"#;

    #[tokio::test]
    async fn test_replay_add_and_save() {
        let mut script = script(SEEDED);
        script.steps = serde_json::from_str(
            r#"[
                { "op": "add", "element": { "kind": "shape", "position": { "x": 0, "y": 0 }, "size": { "width": 5, "height": 5 } } },
                { "op": "save" }
            ]"#,
        )
        .unwrap();

        let report = replay(script, &AppConfig::default(), true).await.unwrap();

        assert_eq!(report.elements.len(), 3);
        assert_eq!(report.elements[2].z_index, 2);
        assert!(report.elements.iter().all(|e| !e.id.is_local()));
        assert_eq!(report.pending_changes, 0);
        assert_eq!(report.stored_elements, 3);
    }

    #[tokio::test]
    async fn test_replay_records_failed_steps() {
        let mut script = script(SEEDED);
        script.steps = serde_json::from_str(
            r#"[
                { "op": "delete", "target": 0 },
                { "op": "offline", "enabled": true },
                { "op": "save" },
                { "op": "select", "target": 7 }
            ]"#,
        )
        .unwrap();

        let report = replay(script, &AppConfig::default(), false).await.unwrap();

        assert!(report.steps[0].ok);
        assert!(!report.steps[2].ok);
        assert!(!report.steps[3].ok);
        assert_eq!(report.pending_changes, 1);
        assert_eq!(report.elements.len(), 1);
        assert!(report.last_error.is_some());
    }

    #[tokio::test]
    async fn test_strict_replay_stops_on_error() {
        let mut script = script(SEEDED);
        script.steps = serde_json::from_str(r#"[{ "op": "delete", "target": 5 }]"#).unwrap();

        let err = replay(script, &AppConfig::default(), true).await.unwrap_err();
        assert!(err.to_string().contains("Step 0 (delete)"));
    }

    #[tokio::test]
    async fn test_replay_restore_after_save() {
        let mut script = script(SEEDED);
        script.steps = serde_json::from_str(
            r#"[
                { "op": "delete", "target": 1 },
                { "op": "save" },
                { "op": "restore", "deleted": 0 }
            ]"#,
        )
        .unwrap();

        let report = replay(script, &AppConfig::default(), true).await.unwrap();
        assert_eq!(report.elements.len(), 2);
    }
}
