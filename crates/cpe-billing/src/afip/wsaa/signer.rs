use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::WsaaError;

/// Produces the DER-encoded CMS signature WSAA expects around a login ticket request.
#[async_trait]
pub trait TicketSigner: Send + Sync {
    async fn sign(&self, ticket_request: &str) -> Result<Vec<u8>, WsaaError>;
}

/// Signs with the `openssl smime` command line, feeding the request through stdin.
#[derive(Debug, Clone)]
pub struct OpensslSigner {
    binary: String,
    certificate: PathBuf,
    private_key: PathBuf,
}

impl OpensslSigner {
    pub fn new(
        binary: impl Into<String>,
        certificate: impl Into<PathBuf>,
        private_key: impl Into<PathBuf>,
    ) -> Self {
        Self {
            binary: binary.into(),
            certificate: certificate.into(),
            private_key: private_key.into(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("smime")
            .arg("-sign")
            .arg("-signer")
            .arg(&self.certificate)
            .arg("-inkey")
            .arg(&self.private_key)
            .arg("-outform")
            .arg("DER")
            .arg("-nodetach")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

#[async_trait]
impl TicketSigner for OpensslSigner {
    async fn sign(&self, ticket_request: &str) -> Result<Vec<u8>, WsaaError> {
        for path in [&self.certificate, &self.private_key] {
            if !path.exists() {
                return Err(WsaaError::Signing(format!(
                    "signing material not found: {}",
                    path.display()
                )));
            }
        }

        let mut child = self
            .command()
            .spawn()
            .map_err(|err| WsaaError::Signing(format!("failed to run {}: {err}", self.binary)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(ticket_request.as_bytes())
                .await
                .map_err(|err| WsaaError::Signing(err.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| WsaaError::Signing(err.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WsaaError::Signing(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(WsaaError::Signing("empty CMS output".into()));
        }
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_certificate_is_reported_before_spawning() {
        let dir = tempfile::tempdir().expect("tempdir");
        let signer = OpensslSigner::new(
            "openssl",
            dir.path().join("missing.pem"),
            dir.path().join("missing.key"),
        );

        match signer.sign("<loginTicketRequest/>").await {
            Err(WsaaError::Signing(message)) => assert!(message.contains("missing.pem")),
            other => panic!("expected signing error, got {other:?}"),
        }
    }
}
