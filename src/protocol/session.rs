//! Per-connection LDAP session.
//!
//! # Responsibilities
//! - Frame BER messages off the byte stream (bounded size)
//! - Authenticate simple binds
//! - Answer searches from the directory store
//! - Reject everything else with `unwillingToPerform`

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::directory::entry::{Attribute, Dn, Entry};
use crate::directory::store::{DirectoryStore, SearchScope, StoreError};
use crate::net::connection::ConnectionId;
use crate::observability::metrics;
use crate::protocol::ber::{self, ProtocolError};
use crate::protocol::message::{
    encode_result, encode_search_entry, BindAuth, BindRequest, LdapResult, Message, Request,
    ResultCode, SearchRequest, BIND_RESPONSE, SEARCH_RESULT_DONE,
};

/// Largest accepted LDAP message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1 << 20;

const READ_CHUNK: usize = 8 * 1024;

/// Additional bind identity configured for the directory.
#[derive(Clone)]
pub struct BindCredential {
    dn: String,
    password: Vec<u8>,
}

impl BindCredential {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            dn: normalize_name(username),
            password: password.as_bytes().to_vec(),
        }
    }

    fn accepts(&self, name: &str, password: &[u8]) -> bool {
        self.dn == normalize_name(name) && self.password == password
    }
}

impl std::fmt::Debug for BindCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindCredential").field("dn", &self.dn).finish_non_exhaustive()
    }
}

fn normalize_name(name: &str) -> String {
    Dn::parse(name)
        .map(|dn| dn.normalized())
        .unwrap_or_else(|_| name.trim().to_lowercase())
}

/// State shared by every session of one server.
#[derive(Debug)]
pub struct SessionContext {
    pub store: Arc<DirectoryStore>,
    pub credential: Option<BindCredential>,
    pub max_message_size: usize,
}

/// Serve one client connection until it unbinds, disconnects or sends
/// something that cannot be decoded.
pub async fn serve<S>(
    mut stream: S,
    context: Arc<SessionContext>,
    connection: ConnectionId,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session {
        context,
        connection,
        bound: None,
    };
    let mut buffer: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        while let Some((element, used)) = ber::decode(&buffer, session.context.max_message_size)? {
            buffer.drain(..used);
            let message = Message::decode(element)?;
            match session.handle(message) {
                Some(frames) if frames.is_empty() => {}
                Some(frames) => {
                    stream.write_all(&frames.concat()).await?;
                    stream.flush().await?;
                }
                None => return Ok(()),
            }
        }

        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
}

struct Session {
    context: Arc<SessionContext>,
    connection: ConnectionId,
    bound: Option<String>,
}

impl Session {
    /// Frames to send back, or `None` to close the connection.
    fn handle(&mut self, message: Message) -> Option<Vec<Vec<u8>>> {
        let id = message.id;
        match message.request {
            Request::Bind(request) => Some(vec![self.bind(id, request)]),
            Request::Search(request) => Some(self.search(id, request)),
            Request::Unbind => {
                tracing::debug!(connection_id = %self.connection, "Client unbound");
                None
            }
            Request::Abandon => Some(Vec::new()),
            Request::Rejected {
                response_tag,
                reason,
            } => {
                metrics::record_operation("rejected", ResultCode::UnwillingToPerform);
                Some(vec![encode_result(
                    id,
                    response_tag,
                    &LdapResult::new(ResultCode::UnwillingToPerform, reason),
                )])
            }
        }
    }

    fn bind(&mut self, id: i64, request: BindRequest) -> Vec<u8> {
        let result = match self.authenticate(&request) {
            Ok(identity) => {
                tracing::debug!(
                    connection_id = %self.connection,
                    identity = identity.as_deref().unwrap_or("anonymous"),
                    "Bind succeeded"
                );
                self.bound = identity;
                LdapResult::success()
            }
            Err(result) => {
                tracing::debug!(
                    connection_id = %self.connection,
                    name = %request.name,
                    code = result.code.as_str(),
                    "Bind refused"
                );
                self.bound = None;
                result
            }
        };
        metrics::record_operation("bind", result.code);
        encode_result(id, BIND_RESPONSE, &result)
    }

    fn authenticate(&self, request: &BindRequest) -> Result<Option<String>, LdapResult> {
        if request.version != 3 && request.version != 2 {
            return Err(LdapResult::new(
                ResultCode::ProtocolError,
                "only LDAP versions 2 and 3 are supported",
            ));
        }
        let password = match &request.auth {
            BindAuth::Simple(password) => password,
            BindAuth::Sasl(mechanism) => {
                return Err(LdapResult::new(
                    ResultCode::AuthMethodNotSupported,
                    format!("SASL mechanism {mechanism} is not supported"),
                ))
            }
        };

        let name = request.name.trim();
        match (name.is_empty(), password.is_empty()) {
            (true, true) => return Ok(None),
            (false, true) => {
                return Err(LdapResult::new(
                    ResultCode::UnwillingToPerform,
                    "unauthenticated binds are not allowed",
                ))
            }
            (true, false) => return Err(invalid_credentials()),
            (false, false) => {}
        }

        if let Some(credential) = &self.context.credential {
            if credential.accepts(name, password) {
                return Ok(Some(normalize_name(name)));
            }
        }

        let dn = Dn::parse(name).map_err(|_| invalid_credentials())?;
        let matches_entry = self
            .context
            .store
            .get(&dn)
            .and_then(|entry| entry.attribute("userPassword").map(|a| a.values.iter().any(|v| v == password)))
            .unwrap_or(false);
        if matches_entry {
            return Ok(Some(dn.normalized()));
        }
        Err(invalid_credentials())
    }

    fn search(&self, id: i64, request: SearchRequest) -> Vec<Vec<u8>> {
        let done = |code: ResultCode, message: String| {
            metrics::record_operation("search", code);
            encode_result(id, SEARCH_RESULT_DONE, &LdapResult::new(code, message))
        };

        let base = match Dn::parse(&request.base) {
            Ok(base) => base,
            Err(e) => return vec![done(ResultCode::InvalidDnSyntax, e.to_string())],
        };

        if base.is_root() && request.scope == SearchScope::Base {
            let dse = self.root_dse();
            let mut frames = Vec::new();
            if request.filter.matches(&dse) {
                frames.push(entry_frame(id, &dse, &request));
            }
            frames.push(done(ResultCode::Success, String::new()));
            return frames;
        }

        let store = &self.context.store;
        match store.search(&base, request.scope, &request.filter, request.size_limit) {
            Ok(result) => {
                tracing::trace!(
                    connection_id = %self.connection,
                    base = %base,
                    returned = result.entries.len(),
                    "Search completed"
                );
                let mut frames: Vec<Vec<u8>> = result
                    .entries
                    .iter()
                    .map(|entry| entry_frame(id, entry, &request))
                    .collect();
                let code = if result.size_limit_exceeded {
                    ResultCode::SizeLimitExceeded
                } else {
                    ResultCode::Success
                };
                frames.push(done(code, String::new()));
                frames
            }
            Err(StoreError::NoSuchObject(dn)) => {
                vec![done(ResultCode::NoSuchObject, format!("no such object: {dn}"))]
            }
            Err(e) => vec![done(ResultCode::Other, e.to_string())],
        }
    }

    fn root_dse(&self) -> Entry {
        let mut dse = Entry::new(Dn::root())
            .with("objectClass", "top")
            .with("supportedLDAPVersion", "3")
            .with("vendorName", env!("CARGO_PKG_NAME"))
            .with("vendorVersion", env!("CARGO_PKG_VERSION"));
        for base in self.context.store.base_dns() {
            dse.add_value("namingContexts", base.as_str());
        }
        dse
    }
}

fn invalid_credentials() -> LdapResult {
    LdapResult::new(ResultCode::InvalidCredentials, "invalid credentials")
}

fn entry_frame(id: i64, entry: &Entry, request: &SearchRequest) -> Vec<u8> {
    let selected = select_attributes(entry, &request.attributes);
    let no_values: &[Vec<u8>] = &[];
    encode_search_entry(
        id,
        entry.dn().as_str(),
        selected.into_iter().map(|attribute| {
            let values = if request.types_only {
                no_values
            } else {
                attribute.values.as_slice()
            };
            (attribute.name.as_str(), values)
        }),
    )
}

/// Apply the requested attribute list: empty or `*` selects every user
/// attribute and a lone `1.1` selects none.
fn select_attributes<'a>(entry: &'a Entry, requested: &[String]) -> Vec<&'a Attribute> {
    if requested.len() == 1 && requested[0] == "1.1" {
        return Vec::new();
    }
    if requested.is_empty() || requested.iter().any(|name| name == "*") {
        return entry.attributes().collect();
    }
    entry
        .attributes()
        .filter(|attribute| {
            requested
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&attribute.name))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ber::{decode, encode, encode_constructed, encode_integer, encode_string};
    use crate::protocol::message::{BIND_REQUEST, SEARCH_REQUEST};
    use tokio::io::duplex;

    const DATA: &str = "\
dn: dc=spring,dc=org
objectClass: domain
dc: spring

dn: uid=bob,dc=spring,dc=org
objectClass: inetOrgPerson
cn: Bob
sn: Hamilton
uid: bob
userPassword: bobspassword
";

    fn context(credential: Option<BindCredential>) -> Arc<SessionContext> {
        let store = DirectoryStore::new(vec![Dn::parse("dc=spring,dc=org").unwrap()], None);
        store.import_ldif(DATA.as_bytes()).unwrap();
        Arc::new(SessionContext {
            store: Arc::new(store),
            credential,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        })
    }

    fn bind_frame(id: i64, name: &str, password: &str) -> Vec<u8> {
        encode_constructed(
            ber::SEQUENCE,
            &[
                encode_integer(ber::INTEGER, id),
                encode_constructed(
                    BIND_REQUEST,
                    &[
                        encode_integer(ber::INTEGER, 3),
                        encode_string(name),
                        encode(0x80, password.as_bytes()),
                    ],
                ),
            ],
        )
    }

    fn result_code(frame: &[u8]) -> i64 {
        let (message, _) = decode(frame, usize::MAX).unwrap().unwrap();
        let op = message.children().unwrap().remove(1);
        op.children().unwrap()[0].integer().unwrap()
    }

    fn bind_code(context: &Arc<SessionContext>, name: &str, password: &str) -> i64 {
        let mut session = Session {
            context: Arc::clone(context),
            connection: ConnectionId::new(),
            bound: None,
        };
        let (element, _) = decode(&bind_frame(1, name, password), usize::MAX).unwrap().unwrap();
        let frames = session.handle(Message::decode(element).unwrap()).unwrap();
        result_code(&frames[0])
    }

    #[test]
    fn bind_outcomes() {
        let context = context(Some(BindCredential::new("uid=root", "secret")));
        assert_eq!(bind_code(&context, "", ""), 0);
        assert_eq!(bind_code(&context, "UID=root", "secret"), 0);
        assert_eq!(bind_code(&context, "uid=root", "wrong"), 49);
        assert_eq!(bind_code(&context, "uid=bob,dc=spring,dc=org", "bobspassword"), 0);
        assert_eq!(bind_code(&context, "uid=bob,dc=spring,dc=org", "nope"), 49);
        assert_eq!(bind_code(&context, "uid=root", ""), 53);
    }

    #[test]
    fn attribute_selection() {
        let entry = Entry::new(Dn::parse("uid=bob,dc=org").unwrap())
            .with("uid", "bob")
            .with("cn", "Bob");
        assert_eq!(select_attributes(&entry, &[]).len(), 2);
        assert_eq!(select_attributes(&entry, &["*".into()]).len(), 2);
        assert!(select_attributes(&entry, &["1.1".into()]).is_empty());
        let only_cn = select_attributes(&entry, &["CN".into()]);
        assert_eq!(only_cn.len(), 1);
        assert_eq!(only_cn[0].name, "cn");
    }

    #[tokio::test]
    async fn serves_frames_over_a_stream() {
        let (mut client, server) = duplex(64 * 1024);
        let task = tokio::spawn(serve(server, context(None), ConnectionId::new()));

        // two requests in one write exercise the framing loop
        let mut request = bind_frame(1, "uid=bob,dc=spring,dc=org", "bobspassword");
        request.extend(bind_frame(2, "uid=bob,dc=spring,dc=org", "wrong"));
        client.write_all(&request).await.unwrap();

        let mut received = Vec::new();
        let mut chunk = [0u8; 256];
        let mut frames = Vec::new();
        while frames.len() < 2 {
            let n = client.read(&mut chunk).await.unwrap();
            received.extend_from_slice(&chunk[..n]);
            while let Some((_, used)) = decode(&received, usize::MAX).unwrap() {
                frames.push(received.drain(..used).collect::<Vec<u8>>());
            }
        }
        assert_eq!(result_code(&frames[0]), 0);
        assert_eq!(result_code(&frames[1]), 49);

        // unbind closes the session cleanly
        let unbind = encode_constructed(
            ber::SEQUENCE,
            &[encode_integer(ber::INTEGER, 3), encode(0x42, &[])],
        );
        client.write_all(&unbind).await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn deeply_nested_filter_ends_the_session_with_an_error() {
        let (mut client, server) = duplex(64 * 1024);
        let task = tokio::spawn(serve(server, context(None), ConnectionId::new()));

        let filter = (0..5000).fold(encode(0x87, b"objectClass"), |filter, _| {
            encode_constructed(0xa2, &[filter])
        });
        let search = encode_constructed(
            ber::SEQUENCE,
            &[
                encode_integer(ber::INTEGER, 7),
                encode_constructed(
                    SEARCH_REQUEST,
                    &[
                        encode_string("dc=spring,dc=org"),
                        encode_integer(ber::ENUMERATED, 2),
                        encode_integer(ber::ENUMERATED, 0),
                        encode_integer(ber::INTEGER, 0),
                        encode_integer(ber::INTEGER, 0),
                        encode(ber::BOOLEAN, &[0]),
                        filter,
                        encode_constructed(ber::SEQUENCE, &[]),
                    ],
                ),
            ],
        );
        assert!(search.len() < DEFAULT_MAX_MESSAGE_SIZE);
        client.write_all(&search).await.unwrap();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(ProtocolError::Malformed("filter nesting"))));
    }
}
