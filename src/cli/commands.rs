use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pt", about = concat!("plantree v", env!("CARGO_PKG_VERSION"), " - step/task trees with checkpoints"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different directory
    #[arg(short = 'C', long = "dir", global = true)]
    pub project_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show a task's step tree
    Show(ShowArgs),
    /// Show done/total counters per node
    Stats(TaskArg),
    /// List the immediate children of a node with progress
    Mirror(MirrorArgs),
    /// Explain whether a step can be completed
    Gate(NodeArgs),
    /// Flip a step between completed and not completed
    Toggle(NodeArgs),
    /// Mark a step completed
    Done(NodeArgs),
    /// Mark a step not completed
    Reopen(NodeArgs),
    /// Confirm checkpoints on a step
    Verify(VerifyArgs),
    /// Block or unblock a step or task node
    Block(BlockArgs),
    /// Add a progress note to a step
    Note(NoteArgs),
    /// Change the title of a step or task node
    Title(TitleArgs),
    /// Set the status of a task node (todo, active, done)
    TaskStatus(TaskStatusArgs),
    /// Delete a step or task node
    Delete(DeleteArgs),
    /// Execute a radar suggestion read from a JSON file (or - for stdin)
    RadarRun(RadarRunArgs),
}

// ---------------------------------------------------------------------------
// Read command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct TaskArg {
    /// Task ID (e.g. TASK-1)
    pub task: String,
}

#[derive(Args)]
pub struct NodeArgs {
    /// Task ID (e.g. TASK-1)
    pub task: String,
    /// Node path (e.g. s:0.t:1.s:2)
    pub path: String,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Task ID (e.g. TASK-1)
    pub task: String,
    /// Status filter: all, todo, active, done (default from config)
    #[arg(long)]
    pub filter: Option<String>,
    /// Only show the subtree at this path
    #[arg(long)]
    pub path: Option<String>,
}

#[derive(Args)]
pub struct MirrorArgs {
    /// Task ID (e.g. TASK-1)
    pub task: String,
    /// Scope path (default: root steps)
    pub path: Option<String>,
}

// ---------------------------------------------------------------------------
// Write command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct VerifyArgs {
    /// Task ID
    pub task: String,
    /// Step path
    pub path: String,
    /// Confirm success criteria
    #[arg(long)]
    pub criteria: bool,
    /// Confirm tests
    #[arg(long)]
    pub tests: bool,
    /// Note attached to each confirmed checkpoint
    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Args)]
pub struct BlockArgs {
    /// Task ID
    pub task: String,
    /// Node path
    pub path: String,
    /// Why the node is blocked
    #[arg(long, conflicts_with = "clear")]
    pub reason: Option<String>,
    /// Unblock instead
    #[arg(long)]
    pub clear: bool,
}

#[derive(Args)]
pub struct NoteArgs {
    /// Task ID
    pub task: String,
    /// Step path
    pub path: String,
    /// Note text
    pub text: String,
}

#[derive(Args)]
pub struct TitleArgs {
    /// Task ID
    pub task: String,
    /// Node path
    pub path: String,
    /// New title
    pub title: String,
}

#[derive(Args)]
pub struct TaskStatusArgs {
    /// Task ID
    pub task: String,
    /// Task node path (ends in t:<n>)
    pub path: String,
    /// New status: todo, active, done
    pub status: String,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Task ID
    pub task: String,
    /// Node path
    pub path: String,
    /// Skip confirmation
    #[arg(long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct RadarRunArgs {
    /// Suggestion JSON file, or - to read stdin
    pub file: String,
    /// Confirm execution
    #[arg(long)]
    pub yes: bool,
}
