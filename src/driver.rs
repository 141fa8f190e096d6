use log::debug;

use crate::{
    Error,
    connection::Context,
    engine::{Engine, SessionConfig, SessionOpenError},
    options::Options,
};

/// Negotiated state of a secure channel. Passed through to the engine untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsState {
    /// E.g. `"TLSv1.3"`.
    pub version: String,
    /// IANA id of the negotiated cipher suite.
    pub cipher_suite: u16,
    /// Server name indication sent by the client, if any.
    pub server_name: Option<String>,
}

/// Names of the extensions enabled for a session. Interpreted by the engine only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionExtensions {
    names: Vec<String>,
}

impl SessionExtensions {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

/// Entry point for the protocol layer. Opens one [`Context`] per client connection.
pub trait Driver {
    /// Opens the execution context of a connection.
    ///
    /// # Parameters
    ///
    /// * `conn_id`: Identifies the connection. Statement ids are scoped to it.
    /// * `capability`: Capability flags negotiated with the client.
    /// * `collation`: Collation id requested by the client.
    /// * `dbname`: Initial database. Empty if none has been requested.
    /// * `tls_state`: `None` if the client connected without a secure channel.
    /// * `extensions`: Extensions to enable for the session.
    fn open_ctx(
        &self,
        conn_id: u64,
        capability: u32,
        collation: u8,
        dbname: &str,
        tls_state: Option<TlsState>,
        extensions: Option<SessionExtensions>,
    ) -> Result<Context, Error>;
}

/// [`Driver`] opening sessions of an [`Engine`].
pub struct EngineDriver<E> {
    engine: E,
    options: Options,
}

impl<E> EngineDriver<E> {
    /// `options` are copied into each context opened by this driver.
    pub fn new(engine: E, options: Options) -> Self {
        Self { engine, options }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn options(&self) -> &Options {
        &self.options
    }
}

impl<E> Driver for EngineDriver<E>
where
    E: Engine,
{
    fn open_ctx(
        &self,
        conn_id: u64,
        capability: u32,
        collation: u8,
        dbname: &str,
        tls_state: Option<TlsState>,
        extensions: Option<SessionExtensions>,
    ) -> Result<Context, Error> {
        let config = SessionConfig {
            conn_id,
            capability,
            tls_state: tls_state.clone(),
            extensions,
        };
        let session = self
            .engine
            .open_session(&config)
            .map_err(|error| match error {
                SessionOpenError::Auth { message } => Error::Auth { message },
                SessionOpenError::Connection(source) => Error::Connection { source },
            })?;

        let configured = session.set_collation(collation).and_then(|()| {
            if dbname.is_empty() {
                Ok(())
            } else {
                session.use_database(dbname)
            }
        });
        if let Err(source) = configured {
            session.close();
            return Err(Error::Connection { source });
        }

        debug!(
            "Opened session for connection {conn_id}. Secure channel: {}",
            tls_state.is_some()
        );
        Ok(Context::new(
            conn_id,
            capability,
            collation,
            dbname.to_owned(),
            tls_state,
            session,
            self.options.clone(),
        ))
    }
}
