//! Key pair generation and ssh-agent loading

use crate::helpers::*;
use deployhook::command::{AgentSession, CommandOutput, CommandSpec};
use deployhook::core::CredentialError;
use deployhook::stages::{CredentialProvisioner, KeyStatus};
use std::sync::Arc;

const REMOTE: &str = "git@github.com:org/app.git";

fn key_loads(runner: &MockRunner) -> Vec<CommandSpec> {
    runner
        .calls()
        .into_iter()
        .filter(|c| c.program == "ssh-add" && !c.matches("ssh-add", &["-l"]))
        .collect()
}

#[tokio::test]
async fn test_generates_key_pair_and_starts_agent() {
    let home = TestHome::new(REMOTE, "app");
    let runner = Arc::new(MockRunner::healthy());
    let provisioner = CredentialProvisioner::new(runner.clone());

    let provisioned = provisioner.provision(&home.config, None).await.unwrap();

    assert_eq!(
        provisioned.key,
        KeyStatus::Generated {
            public_key: MOCK_PUBLIC_KEY.to_string()
        }
    );
    assert_eq!(provisioned.session.auth_sock, MOCK_AGENT_SOCK);
    assert_eq!(provisioned.session.agent_pid, Some(4242));
    assert!(provisioned.key_added);

    let keygen = runner.find("ssh-keygen", &["-q"]).expect("ssh-keygen should run");
    assert!(keygen.args.iter().any(|a| a == "ed25519"));
    assert_eq!(
        keygen.args.last().map(String::as_str),
        home.config.ssh_key.to_str()
    );

    let loads = key_loads(&runner);
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].env_value("SSH_AUTH_SOCK"), Some(MOCK_AGENT_SOCK));
}

#[cfg(unix)]
#[tokio::test]
async fn test_key_directory_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let home = TestHome::new(REMOTE, "app");
    let provisioner = CredentialProvisioner::new(Arc::new(MockRunner::healthy()));
    provisioner.provision(&home.config, None).await.unwrap();

    let ssh_dir = home.config.ssh_key.parent().unwrap();
    let mode = std::fs::metadata(ssh_dir).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o700);
}

#[tokio::test]
async fn test_second_provision_is_a_no_op() {
    let home = TestHome::new(REMOTE, "app");
    let runner = Arc::new(MockRunner::healthy());
    let provisioner = CredentialProvisioner::new(runner.clone());

    let first = provisioner.provision(&home.config, None).await.unwrap();
    let second = provisioner
        .provision(&home.config, Some(first.session.clone()))
        .await
        .unwrap();

    assert_eq!(second.key, KeyStatus::Existing);
    assert_eq!(second.session, first.session);
    assert!(!second.key_added);

    assert_eq!(runner.count("ssh-keygen", &["-q"]), 1, "key must not be regenerated");
    assert_eq!(runner.count("ssh-agent", &[]), 1, "agent must not be restarted");
    assert_eq!(key_loads(&runner).len(), 1, "key must not be added twice");
}

#[tokio::test]
async fn test_existing_key_and_inherited_agent_are_reused() {
    let home = TestHome::new(REMOTE, "app").with_key_pair();
    let runner = Arc::new(MockRunner::healthy());
    let provisioner = CredentialProvisioner::new(runner.clone());
    let inherited = AgentSession::new("/run/user/1000/agent.sock", Some(77));

    let provisioned = provisioner
        .provision(&home.config, Some(inherited.clone()))
        .await
        .unwrap();

    assert_eq!(provisioned.key, KeyStatus::Existing);
    assert_eq!(provisioned.session, inherited);
    assert_eq!(runner.count("ssh-keygen", &["-q"]), 0);
    assert_eq!(runner.count("ssh-agent", &[]), 0);

    let loads = key_loads(&runner);
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].env_value("SSH_AUTH_SOCK"), Some("/run/user/1000/agent.sock"));
}

#[tokio::test]
async fn test_stale_agent_is_replaced() {
    let home = TestHome::new(REMOTE, "app").with_key_pair();
    let runner = Arc::new(MockRunner::healthy().on_with("ssh-add", &["-l"], |spec| {
        if spec.env_value("SSH_AUTH_SOCK") == Some("/tmp/stale.sock") {
            Ok(CommandOutput::new(2, "", "Could not open a connection to your authentication agent."))
        } else {
            Ok(CommandOutput::new(1, "The agent has no identities.\n", ""))
        }
    }));
    let provisioner = CredentialProvisioner::new(runner.clone());

    let provisioned = provisioner
        .provision(&home.config, Some(AgentSession::new("/tmp/stale.sock", None)))
        .await
        .unwrap();

    assert_eq!(provisioned.session.auth_sock, MOCK_AGENT_SOCK);
    assert_eq!(runner.count("ssh-agent", &["-s"]), 1);
    assert_eq!(key_loads(&runner)[0].env_value("SSH_AUTH_SOCK"), Some(MOCK_AGENT_SOCK));
}

#[tokio::test]
async fn test_key_generation_failure() {
    let home = TestHome::new(REMOTE, "app");
    let runner = Arc::new(MockRunner::healthy().on(
        "ssh-keygen",
        &["-q"],
        CommandOutput::new(1, "", "Saving key failed: Permission denied"),
    ));
    let provisioner = CredentialProvisioner::new(runner.clone());

    let result = provisioner.provision(&home.config, None).await;
    assert!(matches!(result, Err(CredentialError::KeyGeneration(_))));
    assert_eq!(runner.count("ssh-agent", &[]), 0);

    let mut session = None;
    assert!(!provisioner.ensure(&home.config, &mut session).await);
    assert_eq!(session, None);
}

#[tokio::test]
async fn test_unparseable_agent_output() {
    let home = TestHome::new(REMOTE, "app").with_key_pair();
    let runner = Arc::new(MockRunner::healthy().on("ssh-agent", &["-s"], CommandOutput::ok("garbage\n")));
    let provisioner = CredentialProvisioner::new(runner.clone());

    let result = provisioner.provision(&home.config, None).await;
    assert!(matches!(result, Err(CredentialError::AgentStart(_))));
    assert!(key_loads(&runner).is_empty());
}

#[tokio::test]
async fn test_ensure_records_new_session() {
    let home = TestHome::new(REMOTE, "app");
    let provisioner = CredentialProvisioner::new(Arc::new(MockRunner::healthy()));

    let mut session = None;
    assert!(provisioner.ensure(&home.config, &mut session).await);
    assert_eq!(session.map(|s| s.auth_sock), Some(MOCK_AGENT_SOCK.to_string()));
}

#[tokio::test]
async fn test_configured_key_path() {
    let home = TestHome::new(REMOTE, "app");
    let key = home.dir.path().join("keys").join("deploy");
    let config = home.config.clone().with_ssh_key(&key);
    let runner = Arc::new(MockRunner::healthy());

    let provisioned = CredentialProvisioner::new(runner.clone())
        .provision(&config, None)
        .await
        .unwrap();

    assert!(matches!(provisioned.key, KeyStatus::Generated { .. }));
    assert!(key.exists());
    assert!(home.dir.path().join("keys/deploy.pub").exists());
    assert!(!home.config.ssh_key.exists());

    let add = key_loads(&runner).pop().unwrap();
    assert_eq!(add.args, vec![key.to_string_lossy().to_string()]);
}
