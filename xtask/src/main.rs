use anyhow::{
    Context,
    Result,
    ensure,
};
use clap::{
    Parser,
    Subcommand,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    process::Command,
};

const HARDHAT_PROJECT: &str = "hardhat-backend";
const ARTIFACT: &str =
    "hardhat-backend/artifacts/contracts/RandomWinnerGame.sol/RandomWinnerGame.json";

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "RandomWinnerGame helper tasks (compile contracts, clippy, tests)",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the solidity contracts with hardhat to refresh the artifact
    Compile,
    /// Run clippy for the entire workspace with warnings-as-errors
    Clippy,
    /// Run the workspace test suite
    Test {
        /// Compile the contracts first so the deploy tool sees a fresh artifact
        #[arg(long)]
        compile: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = repo_root()?;

    match cli.command {
        Commands::Compile => compile_contracts(&root)?,
        Commands::Clippy => run_clippy(&root)?,
        Commands::Test { compile } => {
            if compile {
                compile_contracts(&root)?;
            }
            run_tests(&root)?;
        }
    }

    Ok(())
}

fn repo_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("xtask has no parent directory")
}

fn compile_contracts(root: &Path) -> Result<()> {
    let project = root.join(HARDHAT_PROJECT);
    ensure!(
        project.join("hardhat.config.js").exists(),
        "missing hardhat project at {}",
        project.display()
    );
    let mut cmd = Command::new("npx");
    cmd.arg("hardhat").arg("compile").current_dir(&project);
    run_command(cmd, "npx hardhat compile")?;
    let artifact = root.join(ARTIFACT);
    ensure!(
        artifact.exists(),
        "compilation finished but {} is missing",
        artifact.display()
    );
    println!("Artifact: {}", artifact.display());
    Ok(())
}

fn run_clippy(root: &Path) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("clippy")
        .arg("--workspace")
        .arg("--all-targets")
        .arg("--")
        .arg("-D")
        .arg("warnings")
        .current_dir(root);
    run_command(cmd, "cargo clippy")
}

fn run_tests(root: &Path) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("test").arg("--workspace").current_dir(root);
    run_command(cmd, "cargo test --workspace")
}

fn run_command(mut cmd: Command, label: &str) -> Result<()> {
    println!("Running: {label}");
    let status = cmd
        .status()
        .with_context(|| format!("failed to run {label}"))?;
    ensure!(status.success(), "{label} failed with status {status}");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn parse__test_with_compile__sets_flag() {
        // when
        let cli = Cli::try_parse_from(["xtask", "test", "--compile"]).unwrap();

        // then
        assert!(matches!(cli.command, Commands::Test { compile: true }));
    }

    #[test]
    fn repo_root__is_workspace_root() {
        // when
        let root = repo_root().unwrap();

        // then
        assert!(root.join("rust-crates").exists());
    }

    fn workspace_dependency_names(manifest: &str) -> Vec<String> {
        manifest
            .lines()
            .skip_while(|line| line.trim() != "[workspace.dependencies]")
            .skip(1)
            .take_while(|line| !line.starts_with('['))
            .filter_map(|line| line.split_once('=').map(|(name, _)| name.trim().to_string()))
            .filter(|name| !name.is_empty())
            .collect()
    }

    #[test]
    fn member_manifests__shared_dependencies__inherit_from_workspace() {
        // given
        let root = repo_root().unwrap();
        let workspace = std::fs::read_to_string(root.join("Cargo.toml")).unwrap();
        let shared = workspace_dependency_names(&workspace);
        let members = [
            "rust-crates/deploy-cli",
            "rust-crates/deployments",
            "rust-crates/generated_abi",
            "rust-crates/tui",
            "xtask",
        ];

        // when
        let mut pinned = Vec::new();
        for member in members {
            let manifest =
                std::fs::read_to_string(root.join(member).join("Cargo.toml")).unwrap();
            for line in manifest.lines() {
                let Some((name, spec)) = line.split_once('=') else {
                    continue;
                };
                let name = name.trim();
                if shared.iter().any(|s| s == name) && !spec.contains("workspace = true") {
                    pinned.push(format!("{member}: {name}"));
                }
            }
        }

        // then
        assert!(shared.contains(&"anyhow".to_string()));
        assert!(pinned.is_empty(), "pinned outside the workspace: {pinned:?}");
    }
}
