use std::fs;

use crate::container::{ExecRequest, Substrate};
use crate::emulation::EmulationSubstrate;

#[cfg(test)]
mod emulation_substrate_tests {
    use super::*;

    async fn started(substrate: &EmulationSubstrate) -> String {
        let id = substrate.create("alpine:latest").await.unwrap();
        substrate.start(&id).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_exec_separates_streams_and_reports_exit_code() {
        let substrate = EmulationSubstrate::new();
        let id = started(&substrate).await;

        let request = ExecRequest::shell("echo OUT; echo ERR 1>&2; exit 7", Vec::new(), "/home");
        let output = substrate.exec(&id, &request).await.unwrap();

        assert_eq!(output.stdout_str(), "OUT\n");
        assert_eq!(output.stderr_str(), "ERR\n");
        assert_eq!(output.exit_code, 7);
    }

    #[tokio::test]
    async fn test_exec_runs_in_working_directory_with_env() {
        let substrate = EmulationSubstrate::new();
        let id = started(&substrate).await;

        let request = ExecRequest::shell(
            "touch here.txt; printf '%s' \"$GREETING\"",
            vec!["GREETING=hello world".to_string()],
            "/home",
        );
        let output = substrate.exec(&id, &request).await.unwrap();
        assert_eq!(output.stdout_str(), "hello world");

        let root = substrate.root_of(&id).unwrap();
        assert!(root.join("home/here.txt").exists());
    }

    #[tokio::test]
    async fn test_exec_before_start_is_rejected() {
        let substrate = EmulationSubstrate::new();
        let id = substrate.create("alpine:latest").await.unwrap();

        let request = ExecRequest::shell("true", Vec::new(), "/home");
        assert!(substrate.exec(&id, &request).await.is_err());
    }

    #[tokio::test]
    async fn test_large_output_does_not_stall() {
        let substrate = EmulationSubstrate::new();
        let id = started(&substrate).await;

        // Enough on both pipes to overflow a default pipe buffer.
        let request = ExecRequest::shell(
            "i=0; while [ $i -lt 20000 ]; do echo line-$i; echo err-$i 1>&2; i=$((i+1)); done",
            Vec::new(),
            "/home",
        );
        let output = substrate.exec(&id, &request).await.unwrap();

        assert!(output.success());
        assert_eq!(output.stdout_str().lines().count(), 20000);
        assert_eq!(output.stderr_str().lines().count(), 20000);
    }

    #[tokio::test]
    async fn test_download_of_missing_path_fails() {
        let substrate = EmulationSubstrate::new();
        let id = started(&substrate).await;

        assert!(substrate.download(&id, "/nowhere").await.is_err());
    }

    #[tokio::test]
    async fn test_upload_lands_under_environment_root() {
        let substrate = EmulationSubstrate::new();
        let id = started(&substrate).await;

        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("input.txt"), "payload").unwrap();
        let archive = utils::pack(src.path()).unwrap();

        substrate.upload(&id, "/data", archive).await.unwrap();

        let root = substrate.root_of(&id).unwrap();
        assert_eq!(
            fs::read_to_string(root.join("data/input.txt")).unwrap(),
            "payload"
        );
    }

    #[tokio::test]
    async fn test_remove_deletes_workspace() {
        let substrate = EmulationSubstrate::new();
        let id = started(&substrate).await;
        let root = substrate.root_of(&id).unwrap();
        assert!(root.exists(), "Workspace should exist before removal");

        substrate.remove(&id).await.unwrap();

        assert!(!root.exists(), "Workspace directory should be deleted after removal");
        assert!(substrate.root_of(&id).is_none());
        assert!(substrate.remove(&id).await.is_err());
    }
}
