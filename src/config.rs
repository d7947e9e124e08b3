//! Server configuration
//!
//! The configuration is resolved once at startup from explicit values
//! (command line flags), the environment and the optional config file, in
//! that order of precedence, and is immutable afterwards.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

use crate::error::{KubaruError, Result};
use crate::index::{scan_directory, MediaFile};
use crate::tls::CertificateStore;

/// Environment variable for the username.
pub const USER_ENV: &str = "KUBARU_USER";

/// Environment variable for the password.
pub const PASS_ENV: &str = "KUBARU_PASS";

pub const DEFAULT_USER: &str = "user";
pub const DEFAULT_HOST: &str = "::";
pub const DEFAULT_PORT: u16 = 443;

/// Passwords this short (in bytes) or shorter get a warning.
const WEAK_PASSWORD_LEN: usize = 10;

/// Random bytes in a generated password (16 characters once encoded).
const GENERATED_PASSWORD_BYTES: usize = 12;

/// One layer of unvalidated configuration values. Empty strings count as unset.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub user: Option<String>,
    pub pass: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub path: Option<String>,
}

/// Basic auth credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    pass: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Result<Self> {
        let user = user.into();
        let pass = pass.into();
        if user.contains(':') {
            return Err(KubaruError::validation("username cannot contain a colon"));
        }
        if pass.is_empty() {
            return Err(KubaruError::validation("password cannot be empty"));
        }
        Ok(Self { user, pass })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn pass(&self) -> &str {
        &self.pass
    }

    /// The decoded form of a valid `Authorization: Basic` payload.
    pub fn basic_auth_payload(&self) -> String {
        format!("{}:{}", self.user, self.pass)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Canonical path of the served directory
    pub root: PathBuf,

    /// Basic auth credentials
    pub credentials: Credentials,

    /// Media files below `root`, in walk order
    pub media_files: Vec<MediaFile>,
}

impl ServerConfig {
    /// Resolve and validate the configuration.
    ///
    /// Per field the first non-empty value wins: `explicit`, then the
    /// environment (username and password only), then `file`, then the
    /// built-in default. Indexes the media directory and checks that the
    /// certificate pair in `certs` exists.
    pub fn resolve<F>(
        explicit: ConfigSources,
        file: ConfigSources,
        env: F,
        certs: &CertificateStore,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let user = first_of([explicit.user, env(USER_ENV), file.user])
            .unwrap_or_else(|| DEFAULT_USER.to_string());

        let pass = match first_of([explicit.pass, env(PASS_ENV), file.pass]) {
            Some(pass) => {
                if pass.len() <= WEAK_PASSWORD_LEN {
                    tracing::warn!(
                        "Password is recommended to be longer than {} bytes",
                        WEAK_PASSWORD_LEN
                    );
                }
                pass
            }
            None => generate_password(),
        };
        let credentials = Credentials::new(user, pass)?;

        let host = first_of([explicit.host, file.host]).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match first_of([explicit.port, file.port]) {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| KubaruError::validation(format!("invalid port: {:?}", port)))?,
            None => DEFAULT_PORT,
        };

        let path = first_of([explicit.path, file.path])
            .ok_or_else(|| KubaruError::validation("no path provided"))?;
        let root = validate_root(Path::new(&path))?;
        let media_files = scan_directory(&root)?;

        certs.check_exists()?;

        Ok(Self {
            host,
            port,
            root,
            credentials,
            media_files,
        })
    }

    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn first_of<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|value| !value.is_empty())
}

/// Canonicalize the media root and make sure it is a directory.
fn validate_root(path: &Path) -> Result<PathBuf> {
    let root = std::fs::canonicalize(path).map_err(|e| {
        KubaruError::validation(format!(
            "path must point to a valid directory: {}: {}",
            path.display(),
            e
        ))
    })?;
    if !root.is_dir() {
        return Err(KubaruError::validation(format!(
            "path must point to a valid directory: {} is not a directory",
            path.display()
        )));
    }
    Ok(root)
}

/// Generate a random password: 12 bytes from the OS RNG, URL-safe base64
/// without padding.
pub fn generate_password() -> String {
    let mut bytes = [0u8; GENERATED_PASSWORD_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct Fixture {
        media: TempDir,
        certs_dir: TempDir,
        certs: CertificateStore,
    }

    impl Fixture {
        fn new() -> Self {
            let media = tempfile::tempdir().unwrap();
            std::fs::write(media.path().join("movie.mkv"), b"x").unwrap();
            let certs_dir = tempfile::tempdir().unwrap();
            let certs = CertificateStore::in_dir(certs_dir.path());
            std::fs::write(&certs.cert_path, b"cert").unwrap();
            std::fs::write(&certs.key_path, b"key").unwrap();
            Self {
                media,
                certs_dir,
                certs,
            }
        }

        fn path(&self) -> Option<String> {
            Some(self.media.path().to_string_lossy().into_owned())
        }

        fn explicit(&self) -> ConfigSources {
            ConfigSources {
                path: self.path(),
                ..Default::default()
            }
        }
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let fx = Fixture::new();
        let config =
            ServerConfig::resolve(fx.explicit(), ConfigSources::default(), no_env, &fx.certs)
                .unwrap();

        assert_eq!(config.credentials.user(), "user");
        assert_eq!(config.host, "::");
        assert_eq!(config.port, 443);
        assert_eq!(config.root, std::fs::canonicalize(fx.media.path()).unwrap());
        assert_eq!(config.media_files, vec![MediaFile::new("movie.mkv")]);
        assert_eq!(config.socket_addr(), "[::]:443");
        assert!(fx.certs_dir.path().exists());
    }

    #[test]
    fn test_username_with_colon_is_rejected() {
        let fx = Fixture::new();
        for user in ["a:b", ":", "user:"] {
            let explicit = ConfigSources {
                user: Some(user.to_string()),
                ..fx.explicit()
            };
            let result =
                ServerConfig::resolve(explicit, ConfigSources::default(), no_env, &fx.certs);
            assert!(matches!(result, Err(KubaruError::Validation(_))), "{}", user);
        }

        let env = |key: &str| (key == USER_ENV).then(|| "env:user".to_string());
        let result = ServerConfig::resolve(fx.explicit(), ConfigSources::default(), env, &fx.certs);
        assert!(matches!(result, Err(KubaruError::Validation(_))));
    }

    #[test]
    fn test_generated_password() {
        for _ in 0..32 {
            let pass = generate_password();
            assert_eq!(pass.len(), 16);
            assert!(pass
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
        assert_ne!(generate_password(), generate_password());

        let fx = Fixture::new();
        let config =
            ServerConfig::resolve(fx.explicit(), ConfigSources::default(), no_env, &fx.certs)
                .unwrap();
        assert_eq!(config.credentials.pass().len(), 16);
        assert!(!config.credentials.pass().contains('='));
    }

    #[test]
    fn test_weak_password_is_allowed() {
        let fx = Fixture::new();
        let explicit = ConfigSources {
            pass: Some("short".to_string()),
            ..fx.explicit()
        };
        let config =
            ServerConfig::resolve(explicit, ConfigSources::default(), no_env, &fx.certs).unwrap();
        assert_eq!(config.credentials.pass(), "short");
    }

    #[test]
    fn test_precedence() {
        let fx = Fixture::new();
        let mut env_vars = HashMap::new();
        env_vars.insert(USER_ENV.to_string(), "env-user".to_string());
        env_vars.insert(PASS_ENV.to_string(), "env-password-long".to_string());
        let env = |key: &str| env_vars.get(key).cloned();

        let file = ConfigSources {
            user: Some("file-user".to_string()),
            pass: Some("file-password-long".to_string()),
            host: Some("127.0.0.1".to_string()),
            port: Some("8443".to_string()),
            path: Some("/does/not/matter".to_string()),
        };

        // Explicit beats everything.
        let explicit = ConfigSources {
            user: Some("flag-user".to_string()),
            pass: Some("flag-password-long".to_string()),
            host: Some("0.0.0.0".to_string()),
            port: Some("9443".to_string()),
            path: fx.path(),
        };
        let config = ServerConfig::resolve(explicit, file.clone(), env, &fx.certs).unwrap();
        assert_eq!(config.credentials.user(), "flag-user");
        assert_eq!(config.credentials.pass(), "flag-password-long");
        assert_eq!(config.socket_addr(), "0.0.0.0:9443");

        // Environment beats the file.
        let explicit = ConfigSources {
            user: Some(String::new()),
            ..fx.explicit()
        };
        let config = ServerConfig::resolve(explicit, file.clone(), env, &fx.certs).unwrap();
        assert_eq!(config.credentials.user(), "env-user");
        assert_eq!(config.credentials.pass(), "env-password-long");

        // File beats the defaults.
        let config = ServerConfig::resolve(fx.explicit(), file, no_env, &fx.certs).unwrap();
        assert_eq!(config.credentials.user(), "file-user");
        assert_eq!(config.credentials.pass(), "file-password-long");
        assert_eq!(config.socket_addr(), "127.0.0.1:8443");
    }

    #[test]
    fn test_path_validation() {
        let fx = Fixture::new();

        let result = ServerConfig::resolve(
            ConfigSources::default(),
            ConfigSources::default(),
            no_env,
            &fx.certs,
        );
        assert!(matches!(result, Err(KubaruError::Validation(_))));

        let missing = ConfigSources {
            path: Some(fx.media.path().join("nope").to_string_lossy().into_owned()),
            ..Default::default()
        };
        let result = ServerConfig::resolve(missing, ConfigSources::default(), no_env, &fx.certs);
        assert!(matches!(result, Err(KubaruError::Validation(_))));

        let file = ConfigSources {
            path: Some(
                fx.media
                    .path()
                    .join("movie.mkv")
                    .to_string_lossy()
                    .into_owned(),
            ),
            ..Default::default()
        };
        let result = ServerConfig::resolve(file, ConfigSources::default(), no_env, &fx.certs);
        assert!(matches!(result, Err(KubaruError::Validation(_))));
    }

    #[test]
    fn test_path_is_cleaned() {
        let fx = Fixture::new();
        std::fs::create_dir(fx.media.path().join("sub")).unwrap();
        let explicit = ConfigSources {
            path: Some(format!("{}/sub/../", fx.media.path().display())),
            ..Default::default()
        };
        let config =
            ServerConfig::resolve(explicit, ConfigSources::default(), no_env, &fx.certs).unwrap();
        assert_eq!(config.root, std::fs::canonicalize(fx.media.path()).unwrap());
    }

    #[test]
    fn test_invalid_port() {
        let fx = Fixture::new();
        for port in ["https", "70000", "-1"] {
            let explicit = ConfigSources {
                port: Some(port.to_string()),
                ..fx.explicit()
            };
            let result =
                ServerConfig::resolve(explicit, ConfigSources::default(), no_env, &fx.certs);
            assert!(matches!(result, Err(KubaruError::Validation(_))), "{}", port);
        }
    }

    #[test]
    fn test_missing_certificate() {
        let fx = Fixture::new();
        std::fs::remove_file(&fx.certs.key_path).unwrap();
        let result =
            ServerConfig::resolve(fx.explicit(), ConfigSources::default(), no_env, &fx.certs);
        assert!(matches!(
            result,
            Err(KubaruError::CertificateMissing { .. })
        ));
    }

    #[test]
    fn test_empty_media_directory_is_allowed() {
        let fx = Fixture::new();
        std::fs::remove_file(fx.media.path().join("movie.mkv")).unwrap();
        let config =
            ServerConfig::resolve(fx.explicit(), ConfigSources::default(), no_env, &fx.certs)
                .unwrap();
        assert!(config.media_files.is_empty());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = Credentials::new("alice", "hunter2-hunter2").unwrap();
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
        assert_eq!(credentials.basic_auth_payload(), "alice:hunter2-hunter2");
    }
}
