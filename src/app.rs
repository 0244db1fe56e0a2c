//! Command dispatcher
//!
//! Every request goes through the same gate, in this order:
//!
//! 1. argument validation, before the config file is even read
//! 2. dependency check (client, TOTP tool, secret file)
//! 3. single-instance lock, for `connect` and `disconnect` only
//!
//! Only then is the external client touched. Any failure along the way is
//! final; nothing is retried.

use crate::client::{ClientError, ConnectAnswers, ConnectionState, VpnClient, connect_script};
use crate::config::{Config, ConfigError};
use crate::deps::{self, DepsError};
use crate::lock::{InstanceLock, LockError};
use crate::notify::Notifier;
use crate::vipcode::{self, TotpGenerator, VipCodeError};
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

const TITLE: &str = "VPN";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("connect requires a username (-u USER)")]
    MissingUsername,
    #[error("connect requires a password (-p PASS)")]
    MissingPassword,
    #[error("connect requires a host argument")]
    MissingHost,
    #[error("connect {0} must not contain control characters")]
    ControlCharacters(&'static str),
    #[error("Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("{0}")]
    DepsError(#[from] DepsError),
    #[error("{0}")]
    LockError(#[from] LockError),
    #[error("VIP code error: {0}")]
    VipCodeError(#[from] VipCodeError),
    #[error("VPN client error: {0}")]
    ClientError(#[from] ClientError),
    #[error("already connected")]
    AlreadyConnected,
    #[error("already disconnected")]
    AlreadyDisconnected,
    #[error("failed to connect to {0}")]
    ConnectFailed(String),
    #[error("VPN is still connected after disconnect")]
    DisconnectFailed,
}

/// A request as it arrives from the command line, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Connect {
        username: Option<String>,
        password: Option<String>,
        host: Option<String>,
    },
    Disconnect,
    Status,
    VipCode,
}

impl Request {
    pub fn validate(self) -> Result<Operation, AppError> {
        Ok(match self {
            Request::Connect {
                username,
                password,
                host,
            } => Operation::Connect(ConnectRequest::new(username, password, host)?),
            Request::Disconnect => Operation::Disconnect,
            Request::Status => Operation::Status,
            Request::VipCode => Operation::VipCode,
        })
    }
}

/// A request that passed argument validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Connect(ConnectRequest),
    Disconnect,
    Status,
    VipCode,
}

/// Validated connect arguments
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub username: String,
    pub password: String,
    pub host: String,
}

impl std::fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("username", &self.username)
            .field("password", &"<hidden>")
            .field("host", &self.host)
            .finish()
    }
}

impl ConnectRequest {
    pub fn new(
        username: Option<String>,
        password: Option<String>,
        host: Option<String>,
    ) -> Result<Self, AppError> {
        let username = non_empty(username).ok_or(AppError::MissingUsername)?;
        let password = non_empty(password).ok_or(AppError::MissingPassword)?;
        let host = non_empty(host).ok_or(AppError::MissingHost)?;

        // Each answer must stay a single line of the connect script
        let fields = [("username", &username), ("password", &password), ("host", &host)];
        for (field, value) in fields {
            if value.chars().any(char::is_control) {
                return Err(AppError::ControlCharacters(field));
            }
        }

        Ok(Self {
            username,
            password,
            host,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Validate `request`, then load the config
///
/// Validation comes first so a bad invocation reports its own problem even
/// when the config file is broken.
pub fn prepare(
    request: Request,
    config_path: Option<&Path>,
) -> Result<(Operation, Config), AppError> {
    let operation = request.validate()?;
    let config = Config::discover(config_path)?;
    Ok((operation, config))
}

pub struct App<C, T, N> {
    config: Config,
    client: C,
    totp: T,
    notifier: N,
}

impl<C, T, N> App<C, T, N>
where
    C: VpnClient,
    T: TotpGenerator,
    N: Notifier,
{
    pub fn new(config: Config, client: C, totp: T, notifier: N) -> Self {
        Self {
            config,
            client,
            totp,
            notifier,
        }
    }

    /// Check dependencies and run a validated operation
    ///
    /// Returns the line to print on success.
    pub async fn run(&self, operation: Operation) -> Result<String, AppError> {
        deps::check(&self.config)?;

        match operation {
            Operation::Connect(connect) => {
                let _lock = InstanceLock::acquire(&self.config.lock_file)?;
                self.connect(&connect).await
            }
            Operation::Disconnect => {
                let _lock = InstanceLock::acquire(&self.config.lock_file)?;
                self.disconnect().await
            }
            Operation::Status => self.status().await,
            Operation::VipCode => self.vipcode().await,
        }
    }

    async fn state(&self) -> Result<ConnectionState, AppError> {
        let output = self.client.status().await?;
        let state = ConnectionState::from_status(&output, &self.config.connected_marker);
        debug!("Client reports {}", state);
        Ok(state)
    }

    /// Query the client and notify the current state
    pub async fn status(&self) -> Result<String, AppError> {
        let state = self.state().await?;
        self.notifier.info(TITLE, &state.to_string());
        Ok(state.to_string())
    }

    /// Generate a one-time code from the configured secret
    pub async fn vipcode(&self) -> Result<String, AppError> {
        let secret = vipcode::read_secret(
            &self.config.secret_file,
            self.config.secret_line,
            self.config.secret_field,
        )?;
        Ok(self.totp.generate(&secret).await?)
    }

    pub async fn connect(&self, request: &ConnectRequest) -> Result<String, AppError> {
        if self.state().await?.is_connected() {
            self.notifier.error(TITLE, "Already connected");
            return Err(AppError::AlreadyConnected);
        }

        let started = Instant::now();
        let code = self.vipcode().await?;
        let steps = connect_script(
            &ConnectAnswers {
                host: &request.host,
                group: &self.config.group,
                username: &request.username,
                password: &request.password,
                code: &code,
            },
            &self.config.prompts,
        );

        info!("Connecting to {} as {}", request.host, request.username);
        if let Err(e) = self.client.connect(&steps).await {
            self.notifier
                .error(TITLE, &format!("Connection to {} failed: {}", request.host, e));
            return Err(e.into());
        }

        if !self.state().await?.is_connected() {
            self.notifier
                .error(TITLE, &format!("Failed to connect to {}", request.host));
            return Err(AppError::ConnectFailed(request.host.clone()));
        }

        let message = format!(
            "Connected to {} in {:.1}s",
            request.host,
            started.elapsed().as_secs_f64()
        );
        self.notifier.info(TITLE, &message);
        Ok(message)
    }

    pub async fn disconnect(&self) -> Result<String, AppError> {
        if !self.state().await?.is_connected() {
            self.notifier.error(TITLE, "Already disconnected");
            return Err(AppError::AlreadyDisconnected);
        }

        info!("Disconnecting");
        self.client.disconnect().await?;

        if self.state().await?.is_connected() {
            self.notifier.error(TITLE, "Disconnect failed");
            return Err(AppError::DisconnectFailed);
        }

        self.notifier.info(TITLE, "Disconnected");
        Ok("Disconnected".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Step;
    use crate::notify::Severity;
    use std::cell::{Cell, RefCell};
    use std::fs;
    use tempfile::TempDir;

    const SECRET_FILE: &str = "version 1\n\
                               secret JBSWY3DPEHPK3PXP\n\
                               id SYMC12345678\n\
                               expiry 2027-01-01T00:00:00.000Z\n";

    #[derive(Default)]
    struct FakeClient {
        connected: Cell<bool>,
        /// When false, `connect` runs but the tunnel never comes up
        connect_works: Cell<bool>,
        calls: RefCell<Vec<&'static str>>,
        steps: RefCell<Vec<Step>>,
    }

    impl FakeClient {
        fn connected() -> Self {
            let client = Self::working();
            client.connected.set(true);
            client
        }

        fn working() -> Self {
            let client = Self::default();
            client.connect_works.set(true);
            client
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.borrow().clone()
        }
    }

    impl VpnClient for FakeClient {
        async fn status(&self) -> Result<String, ClientError> {
            self.calls.borrow_mut().push("status");
            Ok(if self.connected.get() {
                ">> state: Connected\n".to_string()
            } else {
                ">> state: Disconnected\n".to_string()
            })
        }

        async fn disconnect(&self) -> Result<(), ClientError> {
            self.calls.borrow_mut().push("disconnect");
            self.connected.set(false);
            Ok(())
        }

        async fn connect(&self, steps: &[Step]) -> Result<(), ClientError> {
            self.calls.borrow_mut().push("connect");
            *self.steps.borrow_mut() = steps.to_vec();
            self.connected.set(self.connect_works.get());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeTotp {
        secrets: RefCell<Vec<String>>,
    }

    impl TotpGenerator for FakeTotp {
        async fn generate(&self, secret: &str) -> Result<String, VipCodeError> {
            self.secrets.borrow_mut().push(secret.to_string());
            Ok("493817".to_string())
        }
    }

    #[derive(Default)]
    struct Notes(RefCell<Vec<(Severity, String)>>);

    impl Notifier for Notes {
        fn notify(&self, severity: Severity, _title: &str, body: &str) {
            self.0.borrow_mut().push((severity, body.to_string()));
        }
    }

    impl Notes {
        fn last(&self) -> Option<(Severity, String)> {
            self.0.borrow().last().cloned()
        }
    }

    struct Fixture {
        dir: TempDir,
        config: Config,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let client_path = dir.path().join("vpn");
        let tool_path = dir.path().join("oathtool");
        let secret_file = dir.path().join(".vipaccess");
        fs::write(&client_path, "").unwrap();
        fs::write(&tool_path, "").unwrap();
        fs::write(&secret_file, SECRET_FILE).unwrap();

        let config = Config {
            client_path,
            totp_tool: tool_path.to_string_lossy().to_string(),
            secret_file,
            lock_file: dir.path().join("vipconnect.lock"),
            ..Config::default()
        };
        Fixture { dir, config }
    }

    fn app(config: Config, client: FakeClient) -> App<FakeClient, FakeTotp, Notes> {
        App::new(config, client, FakeTotp::default(), Notes::default())
    }

    async fn submit(
        app: &App<FakeClient, FakeTotp, Notes>,
        request: Request,
    ) -> Result<String, AppError> {
        app.run(request.validate()?).await
    }

    fn connect_request(user: Option<&str>, pass: Option<&str>, host: Option<&str>) -> Request {
        Request::Connect {
            username: user.map(String::from),
            password: pass.map(String::from),
            host: host.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_missing_connect_arguments() {
        let cases = [
            (
                connect_request(None, Some("pw"), Some("vpn.example.com")),
                "connect requires a username (-u USER)",
            ),
            (
                connect_request(Some("alice"), None, Some("vpn.example.com")),
                "connect requires a password (-p PASS)",
            ),
            (
                connect_request(Some("alice"), Some("pw"), None),
                "connect requires a host argument",
            ),
            (
                connect_request(Some(""), Some("pw"), Some("vpn.example.com")),
                "connect requires a username (-u USER)",
            ),
        ];

        for (request, message) in cases {
            let fx = fixture();
            let app = app(fx.config.clone(), FakeClient::working());

            let err = submit(&app, request).await.unwrap_err();
            assert_eq!(err.to_string(), message);
            assert!(app.client.calls().is_empty());
        }
    }

    #[test]
    fn test_control_characters_rejected() {
        let cases = [
            (Some("al\nice"), Some("pw"), Some("vpn.example.com"), "username"),
            (Some("alice"), Some("pw\ny"), Some("vpn.example.com"), "password"),
            (Some("alice"), Some("pw\r"), Some("vpn.example.com"), "password"),
            (Some("alice"), Some("pw"), Some("vpn.example.com\n1"), "host"),
        ];

        for (user, pass, host, field) in cases {
            let err = connect_request(user, pass, host).validate().unwrap_err();
            assert!(matches!(err, AppError::ControlCharacters(f) if f == field));
            assert_eq!(
                err.to_string(),
                format!("connect {} must not contain control characters", field)
            );
        }
    }

    #[test]
    fn test_missing_username_reported_before_broken_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vipconnect.toml");
        fs::write(&path, "secret_line = \"two\"").unwrap();

        let err = prepare(
            connect_request(None, Some("pw"), Some("vpn.example.com")),
            Some(&path),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "connect requires a username (-u USER)");

        let err = prepare(Request::Status, Some(&path)).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_prepare_loads_config_for_valid_request() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vipconnect.toml");
        fs::write(&path, "group = \"4\"").unwrap();

        let (operation, config) = prepare(
            connect_request(Some("alice"), Some("pw"), Some("vpn.example.com")),
            Some(&path),
        )
        .unwrap();
        assert!(matches!(operation, Operation::Connect(ref c) if c.host == "vpn.example.com"));
        assert_eq!(config.group, "4");
    }

    #[test]
    fn test_connect_request_debug_hides_password() {
        let request = ConnectRequest::new(
            Some("alice".to_string()),
            Some("hunter2".to_string()),
            Some("vpn.example.com".to_string()),
        )
        .unwrap();
        let debug = format!("{:?}", request);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_missing_connect_arguments_checked_before_dependencies() {
        let fx = fixture();
        let mut config = fx.config.clone();
        config.secret_file = fx.dir.path().join("absent");
        let app = app(config, FakeClient::working());

        let request = connect_request(None, Some("pw"), Some("vpn.example.com"));
        let err = submit(&app, request).await.unwrap_err();
        assert!(matches!(err, AppError::MissingUsername));
    }

    #[tokio::test]
    async fn test_missing_dependencies_block_every_request() {
        for mask in 0..7u8 {
            let fx = fixture();
            let mut config = fx.config.clone();
            if mask & 1 == 0 {
                config.client_path = fx.dir.path().join("no-vpn");
            }
            if mask & 2 == 0 {
                config.totp_tool = fx.dir.path().join("no-oathtool").to_string_lossy().to_string();
            }
            if mask & 4 == 0 {
                config.secret_file = fx.dir.path().join("no-secret");
            }

            for request in [
                connect_request(Some("alice"), Some("pw"), Some("vpn.example.com")),
                Request::Disconnect,
                Request::Status,
                Request::VipCode,
            ] {
                let app = app(config.clone(), FakeClient::connected());
                let err = submit(&app, request).await.unwrap_err();
                assert!(matches!(err, AppError::DepsError(_)));
                assert!(app.client.calls().is_empty());
                assert!(app.totp.secrets.borrow().is_empty());
            }
        }
    }

    #[tokio::test]
    async fn test_status_connected() {
        let fx = fixture();
        let app = app(fx.config.clone(), FakeClient::connected());

        let output = submit(&app, Request::Status).await.unwrap();
        assert_eq!(output, "Connected");
        assert_eq!(
            app.notifier.last(),
            Some((Severity::Info, "Connected".to_string()))
        );
    }

    #[tokio::test]
    async fn test_status_disconnected() {
        let fx = fixture();
        let app = app(fx.config.clone(), FakeClient::working());

        let output = submit(&app, Request::Status).await.unwrap();
        assert_eq!(output, "Disconnected");
        assert_eq!(
            app.notifier.last(),
            Some((Severity::Info, "Disconnected".to_string()))
        );
    }

    #[tokio::test]
    async fn test_vipcode_uses_second_field_of_second_line() {
        let fx = fixture();
        let app = app(fx.config.clone(), FakeClient::working());

        let code = submit(&app, Request::VipCode).await.unwrap();
        assert_eq!(code, "493817");
        assert_eq!(*app.totp.secrets.borrow(), vec!["JBSWY3DPEHPK3PXP"]);
        assert!(app.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_connect_success() {
        let fx = fixture();
        let app = app(fx.config.clone(), FakeClient::working());

        let request = connect_request(Some("alice"), Some("hunter2"), Some("vpn.example.com"));
        let message = submit(&app, request).await.unwrap();

        assert!(message.starts_with("Connected to vpn.example.com in "));
        assert_eq!(app.client.calls(), vec!["status", "connect", "status"]);

        let sends: Vec<String> = app
            .client
            .steps
            .borrow()
            .iter()
            .map(|s| s.send.clone())
            .collect();
        assert_eq!(
            sends,
            vec!["connect vpn.example.com", "1", "alice", "hunter2", "493817", "y"]
        );
        assert_eq!(app.notifier.last().map(|n| n.0), Some(Severity::Info));
    }

    #[tokio::test]
    async fn test_connect_when_already_connected() {
        let fx = fixture();
        let app = app(fx.config.clone(), FakeClient::connected());

        let request = connect_request(Some("alice"), Some("hunter2"), Some("vpn.example.com"));
        let err = submit(&app, request).await.unwrap_err();

        assert!(matches!(err, AppError::AlreadyConnected));
        assert_eq!(app.client.calls(), vec!["status"]);
        assert!(app.totp.secrets.borrow().is_empty());
        assert_eq!(
            app.notifier.last(),
            Some((Severity::Error, "Already connected".to_string()))
        );
    }

    #[tokio::test]
    async fn test_connect_tunnel_never_comes_up() {
        let fx = fixture();
        let client = FakeClient::default();
        let app = app(fx.config.clone(), client);

        let request = connect_request(Some("alice"), Some("hunter2"), Some("vpn.example.com"));
        let err = submit(&app, request).await.unwrap_err();

        assert!(matches!(err, AppError::ConnectFailed(ref host) if host == "vpn.example.com"));
        assert_eq!(app.notifier.last().map(|n| n.0), Some(Severity::Error));
    }

    #[tokio::test]
    async fn test_disconnect_success() {
        let fx = fixture();
        let app = app(fx.config.clone(), FakeClient::connected());

        let message = submit(&app, Request::Disconnect).await.unwrap();
        assert_eq!(message, "Disconnected");
        assert_eq!(app.client.calls(), vec!["status", "disconnect", "status"]);
    }

    #[tokio::test]
    async fn test_disconnect_when_already_disconnected() {
        let fx = fixture();
        let app = app(fx.config.clone(), FakeClient::working());

        let err = submit(&app, Request::Disconnect).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyDisconnected));
        assert_eq!(app.client.calls(), vec!["status"]);
        assert_eq!(
            app.notifier.last(),
            Some((Severity::Error, "Already disconnected".to_string()))
        );
    }

    #[tokio::test]
    async fn test_second_instance_is_refused() {
        let fx = fixture();
        let _held = InstanceLock::acquire(&fx.config.lock_file).unwrap();

        for request in [
            connect_request(Some("alice"), Some("hunter2"), Some("vpn.example.com")),
            Request::Disconnect,
        ] {
            let app = app(fx.config.clone(), FakeClient::connected());
            let err = submit(&app, request).await.unwrap_err();
            assert!(matches!(err, AppError::LockError(LockError::AlreadyRunning(_))));
            assert!(app.client.calls().is_empty());
        }

        // status and vipcode are read-only and skip the lock
        let app = app(fx.config.clone(), FakeClient::connected());
        assert!(submit(&app, Request::Status).await.is_ok());
    }
}
