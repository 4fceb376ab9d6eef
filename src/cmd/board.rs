//! Board commands — `taskboard show|watch|add-list|add-task|move-task|delete-*`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use taskboard::board::channel::EventChannel;
use taskboard::board::gateway::BoardApi;
use taskboard::board::reorder::{DragLocation, DragResult, ReorderOutcome, plan_reorder};
use taskboard::board::session::{BoardSession, SessionOptions};
use taskboard::board::socket::{SocketChannel, socket_url};
use taskboard::board::store::{BoardHandle, BoardStore};
use taskboard::config::TaskboardConfig;
use taskboard_common::{BoardList, BoardSnapshot, ListId, TaskId, WorkspaceId};
use tracing::warn;

/// How often `watch` checks that the event socket is still up.
const LIVENESS_CHECK: Duration = Duration::from_secs(1);

pub async fn cmd_show(api: &dyn BoardApi, workspace: &str, json: bool) -> Result<()> {
    let store = fetch_store(api, workspace).await?;
    let snapshot = store.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{}", render_board(&snapshot));
    }
    Ok(())
}

/// Open the board over the backend's event socket and reprint it after every
/// change, until Ctrl+C or `max_updates` changes have been shown.
pub async fn cmd_watch(
    config: &TaskboardConfig,
    api: Arc<dyn BoardApi>,
    workspace: &str,
    max_updates: Option<usize>,
) -> Result<()> {
    let workspace = WorkspaceId::new(workspace);
    if workspace.is_empty() {
        bail!("Workspace id must not be blank");
    }
    let url = socket_url(config.backend_url())?;
    let channel: Arc<dyn EventChannel> = Arc::new(
        SocketChannel::connect_with_capacity(&url, config.sync.channel_capacity)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?,
    );
    let session = BoardSession::open(
        workspace.clone(),
        api,
        channel,
        BoardHandle::new(),
        SessionOptions::from_sync(&config.sync),
    )
    .await
    .with_context(|| format!("Failed to open board for workspace {}", workspace))?;

    println!(
        "{} workspace {} (Ctrl+C to stop)",
        console::style("Watching").cyan(),
        workspace
    );
    print!("{}", render_board(&session.snapshot()?));

    let mut changes = session.board().subscribe();
    let mut liveness = tokio::time::interval(LIVENESS_CHECK);
    let mut shown = 0;
    let result = loop {
        if max_updates.is_some_and(|max| shown >= max) {
            break Ok(());
        }
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                if session.needs_resync()
                    && let Err(e) = session.resync().await
                {
                    warn!(error = %e, "resync failed; showing the board as it is");
                }
                let snapshot = session.snapshot()?;
                shown += 1;
                println!("{}", console::style("-- board updated --").dim());
                print!("{}", render_board(&snapshot));
            }
            _ = liveness.tick() => {
                if !session.is_listening() {
                    break Err(anyhow::anyhow!("Event socket closed by the backend"));
                }
            }
            _ = tokio::signal::ctrl_c() => break Ok(()),
        }
    };

    session.close().await.context("Failed to leave the workspace room")?;
    result
}

pub async fn cmd_add_list(api: &dyn BoardApi, workspace: &str, title: &str) -> Result<()> {
    let list = api
        .create_list(&WorkspaceId::new(workspace), title)
        .await
        .context("Failed to create list")?;
    println!("{} list {} ({})", console::style("Created").green(), list.title, list.id);
    Ok(())
}

pub async fn cmd_add_task(api: &dyn BoardApi, workspace: &str, list: &str, title: &str) -> Result<()> {
    let task = api
        .create_task(&WorkspaceId::new(workspace), &ListId::new(list), title)
        .await
        .context("Failed to create task")?;
    println!(
        "{} task {} ({}) at position {}",
        console::style("Created").green(),
        task.title,
        task.id,
        task.position
    );
    Ok(())
}

pub async fn cmd_move_task(
    api: &dyn BoardApi,
    workspace: &str,
    task: &str,
    to_list: &str,
    index: usize,
) -> Result<()> {
    let store = fetch_store(api, workspace).await?;
    let outcome = plan_move(&store, &TaskId::new(task), &ListId::new(to_list), index)?;

    match &outcome {
        ReorderOutcome::Moved(plan) => {
            api.reorder_tasks(store.workspace_id(), &plan.updates)
                .await
                .context("Failed to persist the new order")?;
            println!(
                "{} task {} to {} at position {} ({} positions written)",
                console::style("Moved").green(),
                task,
                to_list,
                landed_position(&outcome, task).unwrap_or(index as u32),
                plan.updates.len()
            );
        }
        ReorderOutcome::Unchanged | ReorderOutcome::Cancelled => {
            println!("{}", console::style("Task is already there; nothing to do.").dim());
        }
    }
    Ok(())
}

pub async fn cmd_delete_task(api: &dyn BoardApi, workspace: &str, task: &str) -> Result<()> {
    api.delete_task(&TaskId::new(task))
        .await
        .with_context(|| format!("Failed to delete task {} in workspace {}", task, workspace))?;
    println!("{} task {}", console::style("Deleted").green(), task);
    Ok(())
}

pub async fn cmd_delete_list(api: &dyn BoardApi, workspace: &str, list: &str) -> Result<()> {
    api.delete_list(&ListId::new(list))
        .await
        .with_context(|| format!("Failed to delete list {} in workspace {}", list, workspace))?;
    println!("{} list {} and its tasks", console::style("Deleted").green(), list);
    Ok(())
}

async fn fetch_store(api: &dyn BoardApi, workspace: &str) -> Result<BoardStore> {
    let workspace = WorkspaceId::new(workspace);
    if workspace.is_empty() {
        bail!("Workspace id must not be blank");
    }
    let lists: Vec<BoardList> = api
        .fetch_board(&workspace)
        .await
        .with_context(|| format!("Failed to fetch board for workspace {}", workspace))?;
    let mut store = BoardStore::new(workspace);
    store.load_snapshot(lists);
    Ok(store)
}

/// Plan a move of `task` to slot `index` of `to_list` against the board.
fn plan_move(store: &BoardStore, task: &TaskId, to_list: &ListId, index: usize) -> Result<ReorderOutcome> {
    let Some((list_idx, task_idx)) = store.locate(task) else {
        bail!("Task {} is not on this board", task);
    };
    let source = store.lists()[list_idx].id().clone();
    let drag = DragResult {
        task_id: task.clone(),
        source: DragLocation::new(source, task_idx),
        destination: Some(DragLocation::new(to_list.clone(), index)),
    };
    Ok(plan_reorder(store, &drag)?)
}

fn landed_position(outcome: &ReorderOutcome, task: &str) -> Option<u32> {
    outcome
        .updates()
        .iter()
        .find(|u| u.id.as_str() == task)
        .map(|u| u.position)
}

fn render_board(snapshot: &BoardSnapshot) -> String {
    if snapshot.lists.is_empty() {
        return "(empty board)\n".to_string();
    }
    let mut out = String::new();
    for list in &snapshot.lists {
        out.push_str(&format!(
            "{} [{}] ({} tasks)\n",
            list.list.title,
            list.id(),
            list.tasks.len()
        ));
        for task in &list.tasks {
            out.push_str(&format!("  {:>3}. {} [{}]\n", task.position, task.title, task.id));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskboard_common::{List, Task};

    fn board() -> BoardStore {
        let mut store = BoardStore::new(WorkspaceId::new("w1"));
        let lists = [("todo", vec!["a", "b", "c"]), ("done", vec!["d"])]
            .into_iter()
            .map(|(id, tasks)| BoardList {
                list: List {
                    id: ListId::new(id),
                    workspace_id: WorkspaceId::new("w1"),
                    title: id.to_uppercase(),
                    position: None,
                    created_at: None,
                },
                tasks: tasks
                    .into_iter()
                    .enumerate()
                    .map(|(i, t)| Task {
                        id: TaskId::new(t),
                        list_id: ListId::new(id),
                        title: t.to_uppercase(),
                        position: i as u32,
                        created_at: None,
                    })
                    .collect(),
            })
            .collect();
        store.load_snapshot(lists);
        store
    }

    #[test]
    fn test_plan_move_across_lists() {
        let store = board();
        let outcome = plan_move(&store, &TaskId::new("a"), &ListId::new("done"), 0).unwrap();
        assert_eq!(landed_position(&outcome, "a"), Some(0));
        assert_eq!(landed_position(&outcome, "d"), Some(1));
        assert_eq!(landed_position(&outcome, "b"), Some(0));
    }

    #[test]
    fn test_plan_move_to_current_slot_is_noop() {
        let store = board();
        let outcome = plan_move(&store, &TaskId::new("b"), &ListId::new("todo"), 1).unwrap();
        assert!(outcome.is_noop());
    }

    #[test]
    fn test_plan_move_unknown_task_fails() {
        let store = board();
        let err = plan_move(&store, &TaskId::new("zzz"), &ListId::new("todo"), 0).unwrap_err();
        assert!(err.to_string().contains("not on this board"));
    }

    #[test]
    fn test_plan_move_unknown_list_fails() {
        let store = board();
        assert!(plan_move(&store, &TaskId::new("a"), &ListId::new("ghost"), 0).is_err());
    }

    #[test]
    fn test_render_board() {
        let rendered = render_board(&board().snapshot());
        assert!(rendered.starts_with("TODO [todo] (3 tasks)\n"));
        assert!(rendered.contains("    0. A [a]\n"));
        assert!(rendered.contains("DONE [done] (1 tasks)\n"));
    }

    #[test]
    fn test_render_empty_board() {
        assert_eq!(render_board(&BoardSnapshot::default()), "(empty board)\n");
    }
}
