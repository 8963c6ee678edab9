use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;

use common::config::{read_config, ServerConfig};
use common::err::MysqlError;
use common::log::tracing_factory::TracingFactory;
use common::server::{Server, ShutdownHandle};

use server::auth::MYSQL_NATIVE_PASSWORD;
use server::declar::charset::CharacterSet;
use server::declar::column_type::ColumnType;
use server::packet::resultset::{ColumnDescriptor, ResultSet, Value};
use server::server::MysqlServer;
use server::session::{AuthInfo, IdentityProvider, QueryOutcome, Session, User};

#[derive(Parser, Debug)]
#[command(name = "mysql-server")]
#[command(about = "Standalone demo host for the embeddable MySQL protocol server")]
struct CliArgs {
    /// Path to a TOML config file; falls back to ServerConfig::default().
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, help = "override the bind port from the config file")]
    port: Option<u16>,

    #[arg(short, long, default_value_t = false)]
    debug: bool,
}

/// A single hard-coded account, password `demo`, authenticating via
/// `mysql_native_password`. Good enough to exercise the protocol engine
/// without wiring up a real account store.
struct StaticIdentityProvider {
    user: User,
}

impl IdentityProvider for StaticIdentityProvider {
    fn default_plugin(&self) -> &str {
        MYSQL_NATIVE_PASSWORD
    }

    fn plugin(&self, username: &str) -> Option<String> {
        if username == self.user.username {
            Some(self.user.plugin.clone())
        } else {
            None
        }
    }

    fn get_user(&self, username: &str) -> Option<User> {
        if username == self.user.username {
            Some(self.user.clone())
        } else {
            None
        }
    }
}

/// Answers every query with a single fixed row, echoing the SQL text back.
/// Stands in for a real `Session` until one is plugged in.
struct EchoSession;

#[async_trait]
impl Session for EchoSession {
    async fn init(&mut self, _auth: &AuthInfo) -> Result<(), MysqlError> {
        Ok(())
    }

    async fn query(
        &mut self,
        sql: &str,
        _params: &[Value],
        _attributes: &[(String, Value)],
    ) -> Result<QueryOutcome, MysqlError> {
        Ok(QueryOutcome::Rows(ResultSet {
            columns: vec![ColumnDescriptor {
                name: "echo".to_string(),
                column_type: ColumnType::VarString,
                charset: CharacterSet::default(),
            }],
            rows: vec![vec![Value::Str(sql.to_string())]],
        }))
    }

    async fn close(&mut self) {}
}

#[tokio::main]
async fn main() -> Result<(), MysqlError> {
    let args = CliArgs::parse();
    TracingFactory::init_log(args.debug);

    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.net.bind_port = port;
    }

    let identity_provider: Arc<dyn IdentityProvider> = Arc::new(StaticIdentityProvider {
        user: User {
            username: "demo".to_string(),
            credential: server_native_password_hash("demo"),
            plugin: MYSQL_NATIVE_PASSWORD.to_string(),
            default_database: None,
        },
    });
    let session_factory = Arc::new(|| Box::new(EchoSession) as Box<dyn Session>);

    let mut mysql_server = MysqlServer::new(
        config.net.clone(),
        format!("8.0.34-{}", config.app_name),
        identity_provider,
        session_factory,
    );
    mysql_server.start().await?;

    let mut shutdown = ShutdownHandle::create();
    shutdown.add_service(Box::new(mysql_server));

    tokio::signal::ctrl_c().await.ok();
    shutdown.shutdown_services(true).await?;
    Ok(())
}

/// `SHA1(SHA1(password))`, the credential shape `mysql_native_password`
/// expects from an `IdentityProvider`.
fn server_native_password_hash(password: &str) -> Vec<u8> {
    use sha1::{Digest, Sha1};
    let stage1 = Sha1::digest(password.as_bytes());
    let stage2 = Sha1::digest(&stage1);
    stage2.to_vec()
}
