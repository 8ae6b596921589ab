use std::error::Error;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io::{self, LoadedConfig};
use crate::io::file_store::JsonFileStore;
use crate::model::path::{NodeKind, NodePath};
use crate::model::step::{StatusCode, TaskDocument};
use crate::model::tree::{TreeNode, build_tree};
use crate::ops::checkpoint::check_completion;
use crate::ops::index::{NodeIndex, parse_path};
use crate::ops::lens::{self, NodeRef};
use crate::ops::mirror::mirror_items;
use crate::ops::stats::{build_stats, tree_totals};
use crate::ops::status::{step_status, task_status};
use crate::ops::visibility::{Expansion, StatusFilter, compute_visibility, flatten_visible};
use crate::sync::mutation::{CheckpointMark, Mutation, MutationError, StepPatch, TaskPatch};
use crate::sync::mutator::{OptimisticMutator, ToggleOutcome};
use crate::sync::radar::Suggestion;

type CmdResult = Result<(), Box<dyn Error>>;

/// Resolve the start directory (`-C` or the working directory) and load its config
pub fn load_cli_config(project_dir: Option<&str>) -> Result<LoadedConfig, Box<dyn Error>> {
    let start: PathBuf = match project_dir {
        Some(dir) => std::fs::canonicalize(dir)
            .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?,
        None => std::env::current_dir()?,
    };
    Ok(config_io::load_config(&start)?)
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli, loaded: LoadedConfig) -> CmdResult {
    let store = JsonFileStore::from_config(&loaded);
    let session = Session {
        mutator: OptimisticMutator::new(Arc::new(store)),
        loaded,
        json: cli.json,
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(session.run(cli.command))
}

struct Session {
    loaded: LoadedConfig,
    mutator: OptimisticMutator,
    json: bool,
}

impl Session {
    async fn run(&self, command: Commands) -> CmdResult {
        match command {
            // Read commands
            Commands::Show(args) => self.cmd_show(args).await,
            Commands::Stats(args) => self.cmd_stats(args).await,
            Commands::Mirror(args) => self.cmd_mirror(args).await,
            Commands::Gate(args) => self.cmd_gate(args).await,

            // Write commands
            Commands::Toggle(args) => self.cmd_toggle(args).await,
            Commands::Done(args) => self.cmd_set_completed(args, true).await,
            Commands::Reopen(args) => self.cmd_set_completed(args, false).await,
            Commands::Verify(args) => self.cmd_verify(args).await,
            Commands::Block(args) => self.cmd_block(args).await,
            Commands::Note(args) => self.cmd_note(args).await,
            Commands::Title(args) => self.cmd_title(args).await,
            Commands::TaskStatus(args) => self.cmd_task_status(args).await,
            Commands::Delete(args) => self.cmd_delete(args).await,
            Commands::RadarRun(args) => self.cmd_radar_run(args).await,
        }
    }

    fn title_width(&self) -> usize {
        self.loaded.config.view.max_title_width
    }

    async fn document(&self, task: &str) -> Result<Arc<TaskDocument>, Box<dyn Error>> {
        Ok(self.mutator.load(task).await?)
    }

    // -----------------------------------------------------------------------
    // Read commands
    // -----------------------------------------------------------------------

    async fn cmd_show(&self, args: ShowArgs) -> CmdResult {
        let document = self.document(&args.task).await?;
        let filter: StatusFilter = args
            .filter
            .as_deref()
            .unwrap_or(&self.loaded.config.view.default_filter)
            .parse()?;

        let tree = build_tree(&document.steps);
        let stats = build_stats(&tree);
        let index = NodeIndex::build(&tree);
        let roots: &[TreeNode] = match &args.path {
            Some(raw) => std::slice::from_ref(index.get_str(raw)?),
            None => tree.as_slice(),
        };

        let visibility = compute_visibility(roots, filter);
        let rows = flatten_visible(roots, &visibility, Expansion::All);

        if self.json {
            let out = ShowJson {
                task: document.id.clone(),
                title: document.title.clone(),
                revision: document.revision,
                filter: filter.to_string(),
                rows: rows.iter().map(|r| row_to_json(r, &stats)).collect(),
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
            return Ok(());
        }

        println!("{} {} (rev {})", document.id, document.title, document.revision);
        if rows.is_empty() {
            if filter.is_active() {
                println!("no nodes match {}", filter);
            } else {
                println!("no steps");
            }
            return Ok(());
        }
        for line in render_tree(&rows, &stats, self.title_width()) {
            println!("{}", line);
        }
        Ok(())
    }

    async fn cmd_stats(&self, args: TaskArg) -> CmdResult {
        let document = self.document(&args.task).await?;
        let tree = build_tree(&document.steps);
        let stats = build_stats(&tree);
        let totals = tree_totals(&tree);

        if self.json {
            let out = StatsJson {
                task: document.id.clone(),
                nodes: stats.iter().map(|(p, s)| stats_entry(p, *s)).collect(),
                totals: TotalsJson {
                    done: totals.done,
                    total: totals.total,
                    percent: totals.percent(),
                },
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
            return Ok(());
        }

        let index = NodeIndex::build(&tree);
        let rows: Vec<(&TreeNode, _)> = stats
            .iter()
            .filter_map(|(path, s)| index.get(path).ok().map(|node| (node, *s)))
            .collect();
        for line in format_stats(&rows, self.title_width()) {
            println!("{}", line);
        }
        println!(
            "total: {}/{} ({}%)",
            totals.done,
            totals.total,
            totals.percent()
        );
        Ok(())
    }

    async fn cmd_mirror(&self, args: MirrorArgs) -> CmdResult {
        let document = self.document(&args.task).await?;
        let scope = args.path.as_deref().map(parse_path).transpose()?;
        let items = mirror_items(&document.steps, scope.as_ref())?;

        if self.json {
            let out = MirrorJson {
                task: document.id.clone(),
                scope,
                items: &items,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
            return Ok(());
        }

        if items.is_empty() {
            println!("nothing below {}", scope.map(|p| p.to_string()).unwrap_or_else(|| args.task.clone()));
            return Ok(());
        }
        for item in &items {
            println!("{}", format_mirror_item(item, self.title_width()));
        }
        Ok(())
    }

    async fn cmd_gate(&self, args: NodeArgs) -> CmdResult {
        let document = self.document(&args.task).await?;
        let path = parse_path(&args.path)?;
        let step = lens::step_at(&document.steps, &path)?;
        let rejection = check_completion(step, &path).err();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&gate_to_json(&path, rejection.as_ref()))?
            );
        } else {
            for line in format_gate(&path, rejection.as_ref()) {
                println!("{}", line);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Write commands
    // -----------------------------------------------------------------------

    async fn cmd_toggle(&self, args: NodeArgs) -> CmdResult {
        let path = parse_path(&args.path)?;
        self.mutator.load(&args.task).await?;
        match self.mutator.toggle_completion(&args.task, &path).await? {
            ToggleOutcome::Toggled { completed, document } => {
                let verb = if completed { "completed" } else { "reopened" };
                self.report_write(&document, &path, verb)
            }
            ToggleOutcome::NeedsCheckpoints(rejection) => {
                Err(format_gate(&path, Some(&rejection)).join("\n").into())
            }
        }
    }

    async fn cmd_set_completed(&self, args: NodeArgs, completed: bool) -> CmdResult {
        let path = parse_path(&args.path)?;
        let verb = if completed { "completed" } else { "reopened" };
        self.write(&args.task, Mutation::SetCompleted { path, completed }, verb)
            .await
    }

    async fn cmd_verify(&self, args: VerifyArgs) -> CmdResult {
        if !args.criteria && !args.tests {
            return Err("nothing to verify: pass --criteria and/or --tests".into());
        }
        let path = parse_path(&args.path)?;
        let mark = || {
            let mark = CheckpointMark::confirm();
            match &args.note {
                Some(note) => mark.with_note(note.clone()),
                None => mark,
            }
        };
        let mutation = Mutation::Verify {
            path,
            criteria: args.criteria.then(mark),
            tests: args.tests.then(mark),
        };
        self.write(&args.task, mutation, "verified").await
    }

    async fn cmd_block(&self, args: BlockArgs) -> CmdResult {
        let path = parse_path(&args.path)?;
        let blocked = !args.clear;
        let mutation = Mutation::SetBlocked {
            path,
            blocked,
            reason: args.reason,
        };
        let verb = if blocked { "blocked" } else { "unblocked" };
        self.write(&args.task, mutation, verb).await
    }

    async fn cmd_note(&self, args: NoteArgs) -> CmdResult {
        let path = parse_path(&args.path)?;
        let mutation = Mutation::AddNote {
            path,
            note: args.text,
        };
        self.write(&args.task, mutation, "noted").await
    }

    async fn cmd_title(&self, args: TitleArgs) -> CmdResult {
        let path = parse_path(&args.path)?;
        let mutation = match path.kind() {
            NodeKind::Step => Mutation::DefineStep {
                path,
                patch: StepPatch {
                    title: Some(args.title),
                    ..Default::default()
                },
            },
            NodeKind::Task => Mutation::DefineTask {
                path,
                patch: TaskPatch {
                    title: Some(args.title),
                    ..Default::default()
                },
            },
        };
        self.write(&args.task, mutation, "retitled").await
    }

    async fn cmd_task_status(&self, args: TaskStatusArgs) -> CmdResult {
        let path = parse_path(&args.path)?;
        let status = StatusCode::parse(&args.status).ok_or_else(|| {
            format!(
                "unknown status '{}' (expected: todo, active, done)",
                args.status
            )
        })?;
        let mutation = Mutation::DefineTask {
            path,
            patch: TaskPatch {
                status: Some(status),
                ..Default::default()
            },
        };
        self.write(&args.task, mutation, "updated").await
    }

    async fn cmd_delete(&self, args: DeleteArgs) -> CmdResult {
        let path = parse_path(&args.path)?;
        if !args.yes {
            return Err(format!("refusing to delete {} without --yes", path).into());
        }
        self.write(&args.task, Mutation::Delete { path }, "deleted")
            .await
    }

    async fn cmd_radar_run(&self, args: RadarRunArgs) -> CmdResult {
        let text = if args.file == "-" {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        } else {
            std::fs::read_to_string(&args.file)
                .map_err(|e| format!("could not read {}: {}", args.file, e))?
        };
        let suggestion: Suggestion = serde_json::from_str(&text)?;

        if !args.yes {
            println!(
                "{} on {}: {}",
                suggestion.action, suggestion.target, suggestion.reason
            );
            println!("re-run with --yes to execute");
            return Ok(());
        }

        let confirmed = suggestion.confirm();
        let path = confirmed.to_mutation()?.path().clone();
        let document = self
            .mutator
            .execute_suggestion(&confirmed)
            .await
            .map_err(explain)?;
        self.report_write(&document, &path, &confirmed.suggestion().action)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn write(&self, task: &str, mutation: Mutation, verb: &str) -> CmdResult {
        let path = mutation.path().clone();
        self.mutator.load(task).await?;
        let document = self.mutator.apply(task, mutation).await.map_err(explain)?;
        self.report_write(&document, &path, verb)
    }

    fn report_write(&self, document: &TaskDocument, path: &NodePath, verb: &str) -> CmdResult {
        let status = match lens::resolve(&document.steps, path) {
            Ok(NodeRef::Step(step)) => Some(step_status(step).as_str().to_string()),
            Ok(NodeRef::Task(task)) => Some(task_status(task).as_str().to_string()),
            Err(_) => None,
        };
        if self.json {
            let out = WriteJson {
                task: document.id.clone(),
                revision: document.revision,
                path: path.clone(),
                status,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        } else {
            println!(
                "{} {} {} (rev {})",
                document.id, path, verb, document.revision
            );
        }
        Ok(())
    }
}

/// Gate rejections get the blocker list; everything else keeps its own message
fn explain(err: MutationError) -> Box<dyn Error> {
    match err {
        MutationError::Rejected(rejection) => {
            format_gate(&rejection.path, Some(&rejection)).join("\n").into()
        }
        other => Box::new(other),
    }
}
