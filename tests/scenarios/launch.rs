//! Entry point launch and prior-instance replacement

use crate::helpers::*;
use deployhook::command::CommandError;
use deployhook::core::LaunchError;
use deployhook::stages::ProcessSupervisor;
use std::sync::Arc;

#[tokio::test]
async fn test_missing_entry_point() {
    let home = TestHome::new("git@github.com:org/app.git", "app");
    std::fs::create_dir_all(home.project_path()).unwrap();
    let runner = Arc::new(MockRunner::healthy());
    let supervisor = ProcessSupervisor::new(runner.clone());

    let err = supervisor.launch(&home.project_path()).await.unwrap_err();

    assert!(matches!(err, LaunchError::EntryPointMissing(path) if path.ends_with("run.sh")));
    assert_eq!(runner.count("pkill", &[]), 0, "nothing may be terminated without a replacement");
    assert!(runner.detached().is_empty());
}

#[tokio::test]
async fn test_launch_replaces_prior_instance() {
    let home = TestHome::new("git@github.com:org/app.git", "app").with_working_copy();
    let project = home.project_path();
    let runner = Arc::new(MockRunner::healthy());
    let supervisor = ProcessSupervisor::new(runner.clone());

    let pid = supervisor.launch(&project).await.unwrap();
    assert_eq!(pid, Some(31337));

    let pkill = runner.find("pkill", &["-f"]).unwrap();
    let signature = &pkill.args[1];
    assert!(signature.contains("run\\.sh"));
    assert!(signature.ends_with(" PROD"));

    let detached = runner.detached();
    assert_eq!(detached.len(), 1);
    assert_eq!(detached[0].program, project.join("run.sh").to_string_lossy());
    assert_eq!(detached[0].args, vec!["PROD"]);
    assert_eq!(detached[0].cwd.as_deref(), Some(project.as_path()));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(project.join("run.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111, "entry point must be executable");
    }
}

#[tokio::test]
async fn test_custom_entry_point_and_mode() {
    let home = TestHome::new("git@github.com:org/app.git", "app");
    let project = home.project_path();
    write_script(&project.join("bin/start"));
    let runner = Arc::new(MockRunner::healthy());
    let supervisor = ProcessSupervisor::new(runner.clone())
        .with_entry_script("bin/start")
        .with_run_mode("STAGING");

    supervisor.launch(&project).await.unwrap();

    let detached = runner.detached();
    assert!(detached[0].program.ends_with("bin/start"));
    assert_eq!(detached[0].args, vec!["STAGING"]);
}

#[tokio::test]
async fn test_missing_pkill_does_not_block_launch() {
    let home = TestHome::new("git@github.com:org/app.git", "app").with_working_copy();
    let runner = Arc::new(MockRunner::healthy().fail_with("pkill", &[], |_| CommandError::Spawn {
        program: "pkill".to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
    }));
    let supervisor = ProcessSupervisor::new(runner.clone());

    assert_eq!(supervisor.launch(&home.project_path()).await.unwrap(), Some(31337));
    assert_eq!(runner.detached().len(), 1);
}
