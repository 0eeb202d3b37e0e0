//! Shared constants for the security gate.

/// Environment variable for the project directory. Set by agents at startup
/// so the gate can find the correct project even in worktree mode.
pub const PROJECT_DIR_ENV_VAR: &str = "AUTO_IFLOW_PROJECT_DIR";

/// Environment variable for the spec directory (task_intake lookup).
pub const SPEC_DIR_ENV_VAR: &str = "AUTO_IFLOW_SPEC_DIR";

/// Environment variables for task routing context.
pub const TASK_TYPE_ENV_VAR: &str = "AUTO_IFLOW_TASK_TYPE";
pub const NOISE_PROFILE_ENV_VAR: &str = "AUTO_IFLOW_NOISE_PROFILE";

/// Manual verification guardrails. When enabled, shell commands are blocked
/// to avoid hanging local sessions.
pub const MANUAL_VERIFICATION_ENV_VAR: &str = "AUTO_IFLOW_MANUAL_VERIFICATION";
pub const MANUAL_VERIFICATION_SUBTASK_ENV_VAR: &str = "AUTO_IFLOW_MANUAL_VERIFICATION_SUBTASK";

/// Test commands must run only in the post-code test phase.
pub const BLOCK_TEST_COMMANDS_ENV_VAR: &str = "AUTO_IFLOW_BLOCK_TEST_COMMANDS";
pub const TEST_PLAN_ENV_VAR: &str = "AUTO_IFLOW_TEST_PLAN";

/// Security configuration filenames controlling which commands may run.
pub const ALLOWLIST_FILENAME: &str = ".auto-iflow-allowlist";
pub const PROFILE_FILENAME: &str = ".auto-iflow-security.json";

/// Commands always available regardless of project profile.
pub const BASE_COMMANDS: &[&str] = &[
    "ls", "cat", "head", "tail", "wc", "grep", "rg", "find", "echo", "pwd",
    "mkdir", "touch", "cp", "mv", "sed", "awk", "sort", "uniq", "diff",
    "tr", "cut", "xargs", "which", "env", "date", "basename", "dirname",
    "git", "node", "npm", "npx", "python", "python3", "pip", "pip3",
    "pytest", "cargo", "go", "make",
];

/// Shell interpreters are never allowed as invoked programs, even when a
/// project profile lists them: arbitrary `-c` strings bypass the gate.
pub const SHELL_INTERPRETERS: &[&str] = &[
    "bash", "sh", "zsh", "fish", "dash", "ksh", "csh", "tcsh",
];

/// Fallback list used when `BLOCK_TEST_COMMANDS` is set but no task-level
/// test plan is available.
pub const DEFAULT_BLOCKED_TEST_COMMANDS: &[&str] = &[
    "npm test",
    "npm run test",
    "npm run test:backend",
    "npm run test:e2e",
    "pnpm test",
    "pnpm run test",
    "yarn test",
    "pytest",
    "go test",
    "cargo test",
    "bundle exec rspec",
    "dotnet test",
    "mvn test",
    "gradle test",
];

/// Commands blocked for non-code tasks (analysis, plan, audit, content):
/// build/test/package runners, git history mutation, and setup scripts.
pub const NON_CODE_BLOCKED_COMMANDS: &[&str] = &[
    "npm test",
    "npm run test",
    "npm run test:backend",
    "npm run test:e2e",
    "npm run build",
    "npm run package",
    "pnpm test",
    "pnpm run test",
    "yarn test",
    "pytest",
    "go test",
    "cargo test",
    "bundle exec rspec",
    "dotnet test",
    "mvn test",
    "gradle test",
    "git commit",
    "git merge",
    "git rebase",
    "git cherry-pick",
    "./init.sh",
    "chmod +x init.sh",
];

/// Commands permitted for auxiliary server specs accepted from config.
pub const AUX_SERVER_SAFE_COMMANDS: &[&str] =
    &["npx", "npm", "node", "python", "python3", "uv", "uvx"];

/// Argument flags that turn a safe interpreter into an arbitrary-code vector.
pub const AUX_SERVER_DANGEROUS_FLAGS: &[&str] = &[
    "-e",
    "-c",
    "-m",
    "-p",
    "--eval",
    "--print",
    "--input-type=module",
    "--experimental-loader",
    "--require",
    "-r",
];
