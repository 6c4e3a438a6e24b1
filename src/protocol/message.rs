//! LDAPv3 message decoding and response encoding (RFC 4511).

use crate::directory::filter::Filter;
use crate::directory::store::SearchScope;
use crate::protocol::ber::{
    self, encode_constructed, encode_integer, encode_string, Element, ProtocolError,
};

pub const BIND_REQUEST: u8 = 0x60;
pub const BIND_RESPONSE: u8 = 0x61;
pub const UNBIND_REQUEST: u8 = 0x42;
pub const SEARCH_REQUEST: u8 = 0x63;
pub const SEARCH_RESULT_ENTRY: u8 = 0x64;
pub const SEARCH_RESULT_DONE: u8 = 0x65;
pub const MODIFY_REQUEST: u8 = 0x66;
pub const MODIFY_RESPONSE: u8 = 0x67;
pub const ADD_REQUEST: u8 = 0x68;
pub const ADD_RESPONSE: u8 = 0x69;
pub const DEL_REQUEST: u8 = 0x4a;
pub const DEL_RESPONSE: u8 = 0x6b;
pub const MODIFY_DN_REQUEST: u8 = 0x6c;
pub const MODIFY_DN_RESPONSE: u8 = 0x6d;
pub const COMPARE_REQUEST: u8 = 0x6e;
pub const COMPARE_RESPONSE: u8 = 0x6f;
pub const ABANDON_REQUEST: u8 = 0x50;
pub const EXTENDED_REQUEST: u8 = 0x77;
pub const EXTENDED_RESPONSE: u8 = 0x78;

const SIMPLE_AUTH: u8 = 0x80;
const SASL_AUTH: u8 = 0xa3;

const FILTER_AND: u8 = 0xa0;
const FILTER_OR: u8 = 0xa1;
const FILTER_NOT: u8 = 0xa2;
const FILTER_EQUALITY: u8 = 0xa3;
const FILTER_SUBSTRINGS: u8 = 0xa4;
const FILTER_GREATER_OR_EQUAL: u8 = 0xa5;
const FILTER_LESS_OR_EQUAL: u8 = 0xa6;
const FILTER_PRESENT: u8 = 0x87;
const FILTER_APPROX: u8 = 0xa8;

/// Deepest `and`/`or`/`not` nesting accepted in a search filter.
pub const MAX_FILTER_DEPTH: usize = 32;

const SUBSTRING_INITIAL: u8 = 0x80;
const SUBSTRING_ANY: u8 = 0x81;
const SUBSTRING_FINAL: u8 = 0x82;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum ResultCode {
    Success = 0,
    ProtocolError = 2,
    SizeLimitExceeded = 4,
    AuthMethodNotSupported = 7,
    NoSuchObject = 32,
    InvalidDnSyntax = 34,
    InvalidCredentials = 49,
    UnwillingToPerform = 53,
    Other = 80,
}

impl ResultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::Success => "success",
            ResultCode::ProtocolError => "protocolError",
            ResultCode::SizeLimitExceeded => "sizeLimitExceeded",
            ResultCode::AuthMethodNotSupported => "authMethodNotSupported",
            ResultCode::NoSuchObject => "noSuchObject",
            ResultCode::InvalidDnSyntax => "invalidDNSyntax",
            ResultCode::InvalidCredentials => "invalidCredentials",
            ResultCode::UnwillingToPerform => "unwillingToPerform",
            ResultCode::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindAuth {
    Simple(Vec<u8>),
    Sasl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    pub version: i64,
    pub name: String,
    pub auth: BindAuth,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base: String,
    pub scope: SearchScope,
    pub size_limit: usize,
    pub types_only: bool,
    pub filter: Filter,
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Bind(BindRequest),
    Unbind,
    Search(SearchRequest),
    Abandon,
    /// A well-formed request this server does not carry out; answered with
    /// `unwillingToPerform` under `response_tag`.
    Rejected {
        response_tag: u8,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub request: Request,
}

impl Message {
    pub fn decode(element: Element) -> Result<Self, ProtocolError> {
        let element = element.expect_tag(ber::SEQUENCE)?;
        let mut children = element.children()?.into_iter();
        let id = children
            .next()
            .ok_or(ProtocolError::Malformed("message id"))?
            .expect_tag(ber::INTEGER)?
            .integer()?;
        let op = children.next().ok_or(ProtocolError::Malformed("protocol operation"))?;
        // any further children are controls, which are ignored

        let request = match op.tag {
            BIND_REQUEST => Request::Bind(decode_bind(&op)?),
            UNBIND_REQUEST => Request::Unbind,
            SEARCH_REQUEST => match decode_search(&op) {
                Ok(search) => Request::Search(search),
                Err(ProtocolError::UnsupportedFilter(_)) => Request::Rejected {
                    response_tag: SEARCH_RESULT_DONE,
                    reason: "unsupported filter type",
                },
                Err(e) => return Err(e),
            },
            ABANDON_REQUEST => Request::Abandon,
            MODIFY_REQUEST => rejected(MODIFY_RESPONSE),
            ADD_REQUEST => rejected(ADD_RESPONSE),
            DEL_REQUEST => rejected(DEL_RESPONSE),
            MODIFY_DN_REQUEST => rejected(MODIFY_DN_RESPONSE),
            COMPARE_REQUEST => rejected(COMPARE_RESPONSE),
            EXTENDED_REQUEST => rejected(EXTENDED_RESPONSE),
            other => return Err(ProtocolError::UnsupportedOperation(other)),
        };
        Ok(Self { id, request })
    }
}

fn rejected(response_tag: u8) -> Request {
    Request::Rejected {
        response_tag,
        reason: "operation not supported by the embedded directory",
    }
}

fn decode_bind(op: &Element) -> Result<BindRequest, ProtocolError> {
    let children = op.children()?;
    let [version, name, auth] = children.as_slice() else {
        return Err(ProtocolError::Malformed("bind request"));
    };
    let auth = match auth.tag {
        SIMPLE_AUTH => BindAuth::Simple(auth.contents.clone()),
        SASL_AUTH => {
            let mechanism = auth
                .children()?
                .into_iter()
                .next()
                .ok_or(ProtocolError::Malformed("SASL credentials"))?
                .string()?;
            BindAuth::Sasl(mechanism)
        }
        _ => return Err(ProtocolError::Malformed("bind authentication choice")),
    };
    Ok(BindRequest {
        version: version.integer()?,
        name: name.string()?,
        auth,
    })
}

fn decode_search(op: &Element) -> Result<SearchRequest, ProtocolError> {
    let children = op.children()?;
    let [base, scope, _deref, size_limit, _time_limit, types_only, filter, attributes] =
        children.as_slice()
    else {
        return Err(ProtocolError::Malformed("search request"));
    };
    let scope = match scope.integer()? {
        0 => SearchScope::Base,
        1 => SearchScope::OneLevel,
        2 => SearchScope::Subtree,
        _ => return Err(ProtocolError::Malformed("search scope")),
    };
    let size_limit = usize::try_from(size_limit.integer()?)
        .map_err(|_| ProtocolError::Malformed("size limit"))?;
    Ok(SearchRequest {
        base: base.string()?,
        scope,
        size_limit,
        types_only: types_only.boolean()?,
        filter: decode_filter(filter, 0)?,
        attributes: attributes
            .children()?
            .iter()
            .map(Element::string)
            .collect::<Result<_, _>>()?,
    })
}

fn decode_filter(element: &Element, depth: usize) -> Result<Filter, ProtocolError> {
    if depth > MAX_FILTER_DEPTH {
        return Err(ProtocolError::Malformed("filter nesting"));
    }
    let assertion = |element: &Element| -> Result<(String, Vec<u8>), ProtocolError> {
        match element.children()?.as_slice() {
            [attribute, value] => Ok((attribute.string()?, value.contents.clone())),
            _ => Err(ProtocolError::Malformed("attribute value assertion")),
        }
    };

    Ok(match element.tag {
        FILTER_AND => Filter::And(decode_filters(element, depth + 1)?),
        FILTER_OR => Filter::Or(decode_filters(element, depth + 1)?),
        FILTER_NOT => {
            let inner = element
                .children()?
                .into_iter()
                .next()
                .ok_or(ProtocolError::Malformed("not filter"))?;
            Filter::Not(Box::new(decode_filter(&inner, depth + 1)?))
        }
        FILTER_EQUALITY => {
            let (attribute, value) = assertion(element)?;
            Filter::Equality { attribute, value }
        }
        FILTER_GREATER_OR_EQUAL => {
            let (attribute, value) = assertion(element)?;
            Filter::GreaterOrEqual { attribute, value }
        }
        FILTER_LESS_OR_EQUAL => {
            let (attribute, value) = assertion(element)?;
            Filter::LessOrEqual { attribute, value }
        }
        FILTER_APPROX => {
            let (attribute, value) = assertion(element)?;
            Filter::Approx { attribute, value }
        }
        FILTER_PRESENT => Filter::Present(element.string()?),
        FILTER_SUBSTRINGS => {
            let children = element.children()?;
            let [attribute, substrings] = children.as_slice() else {
                return Err(ProtocolError::Malformed("substring filter"));
            };
            let mut initial = None;
            let mut any = Vec::new();
            let mut last = None;
            for part in substrings.children()? {
                match part.tag {
                    SUBSTRING_INITIAL => initial = Some(part.contents),
                    SUBSTRING_ANY => any.push(part.contents),
                    SUBSTRING_FINAL => last = Some(part.contents),
                    _ => return Err(ProtocolError::Malformed("substring choice")),
                }
            }
            Filter::Substrings {
                attribute: attribute.string()?,
                initial,
                any,
                last,
            }
        }
        other => return Err(ProtocolError::UnsupportedFilter(other)),
    })
}

fn decode_filters(element: &Element, depth: usize) -> Result<Vec<Filter>, ProtocolError> {
    element
        .children()?
        .iter()
        .map(|child| decode_filter(child, depth))
        .collect()
}

/// Outcome carried by every LDAP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapResult {
    pub code: ResultCode,
    pub matched_dn: String,
    pub message: String,
}

impl LdapResult {
    pub fn success() -> Self {
        Self::new(ResultCode::Success, "")
    }

    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            matched_dn: String::new(),
            message: message.into(),
        }
    }

    fn encode_components(&self) -> Vec<Vec<u8>> {
        vec![
            encode_integer(ber::ENUMERATED, self.code as i64),
            encode_string(&self.matched_dn),
            encode_string(&self.message),
        ]
    }
}

fn envelope(id: i64, op: Vec<u8>) -> Vec<u8> {
    encode_constructed(ber::SEQUENCE, &[encode_integer(ber::INTEGER, id), op])
}

/// Encode a response consisting of only an LDAPResult.
pub fn encode_result(id: i64, response_tag: u8, result: &LdapResult) -> Vec<u8> {
    envelope(id, encode_constructed(response_tag, &result.encode_components()))
}

/// Encode a SearchResultEntry.
pub fn encode_search_entry<'a, I>(id: i64, dn: &str, attributes: I) -> Vec<u8>
where
    I: IntoIterator<Item = (&'a str, &'a [Vec<u8>])>,
{
    let attributes: Vec<Vec<u8>> = attributes
        .into_iter()
        .map(|(name, values)| {
            let values: Vec<Vec<u8>> = values.iter().map(encode_string).collect();
            encode_constructed(
                ber::SEQUENCE,
                &[encode_string(name), encode_constructed(ber::SET, &values)],
            )
        })
        .collect();
    envelope(
        id,
        encode_constructed(
            SEARCH_RESULT_ENTRY,
            &[encode_string(dn), encode_constructed(ber::SEQUENCE, &attributes)],
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ber::{decode, encode, encode_constructed};

    fn message(id: i64, op: Vec<u8>) -> Element {
        decode(&envelope(id, op), 1 << 20).unwrap().unwrap().0
    }

    fn simple_bind(name: &str, password: &str) -> Vec<u8> {
        encode_constructed(
            BIND_REQUEST,
            &[
                encode_integer(ber::INTEGER, 3),
                encode_string(name),
                encode(SIMPLE_AUTH, password.as_bytes()),
            ],
        )
    }

    fn search(filter: Vec<u8>, attributes: &[&str]) -> Vec<u8> {
        let attributes: Vec<Vec<u8>> = attributes.iter().map(encode_string).collect();
        encode_constructed(
            SEARCH_REQUEST,
            &[
                encode_string("dc=spring,dc=org"),
                encode_integer(ber::ENUMERATED, 2),
                encode_integer(ber::ENUMERATED, 0),
                encode_integer(ber::INTEGER, 10),
                encode_integer(ber::INTEGER, 0),
                encode(ber::BOOLEAN, &[0]),
                filter,
                encode_constructed(ber::SEQUENCE, &attributes),
            ],
        )
    }

    #[test]
    fn decodes_simple_bind() {
        let decoded = Message::decode(message(1, simple_bind("uid=admin", "secret"))).unwrap();
        assert_eq!(decoded.id, 1);
        assert_eq!(
            decoded.request,
            Request::Bind(BindRequest {
                version: 3,
                name: "uid=admin".into(),
                auth: BindAuth::Simple(b"secret".to_vec()),
            })
        );
    }

    #[test]
    fn decodes_search_with_nested_filter() {
        let filter = encode_constructed(
            FILTER_AND,
            &[
                encode(FILTER_PRESENT, b"objectClass"),
                encode_constructed(
                    FILTER_SUBSTRINGS,
                    &[
                        encode_string("cn"),
                        encode_constructed(ber::SEQUENCE, &[encode(SUBSTRING_INITIAL, b"Bob")]),
                    ],
                ),
            ],
        );
        let decoded = Message::decode(message(2, search(filter, &["cn", "uid"]))).unwrap();
        let Request::Search(search) = decoded.request else {
            panic!("expected a search request");
        };
        assert_eq!(search.scope, SearchScope::Subtree);
        assert_eq!(search.size_limit, 10);
        assert_eq!(search.attributes, vec!["cn", "uid"]);
        assert_eq!(
            search.filter,
            Filter::And(vec![
                Filter::Present("objectClass".into()),
                Filter::Substrings {
                    attribute: "cn".into(),
                    initial: Some(b"Bob".to_vec()),
                    any: vec![],
                    last: None,
                },
            ])
        );
    }

    #[test]
    fn extensible_filters_are_rejected_not_fatal() {
        let filter = encode_constructed(0xa9, &[encode(0x82, b"cn")]);
        let decoded = Message::decode(message(3, search(filter, &[]))).unwrap();
        assert!(matches!(
            decoded.request,
            Request::Rejected { response_tag: SEARCH_RESULT_DONE, .. }
        ));
    }

    fn nested_not(levels: usize) -> Vec<u8> {
        (0..levels).fold(encode(FILTER_PRESENT, b"objectClass"), |filter, _| {
            encode_constructed(FILTER_NOT, &[filter])
        })
    }

    #[test]
    fn filter_nesting_is_bounded() {
        let decoded = Message::decode(message(4, search(nested_not(MAX_FILTER_DEPTH), &[]))).unwrap();
        assert!(matches!(decoded.request, Request::Search(_)));

        let err = Message::decode(message(5, search(nested_not(MAX_FILTER_DEPTH + 1), &[])))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed("filter nesting")));
    }

    #[test]
    fn deeply_nested_filter_fails_cleanly_on_a_small_stack() {
        // thousands of levels still fit well inside the message size limit
        let frame = envelope(6, search(nested_not(5000), &[]));
        assert!(frame.len() < 1 << 20);
        let result = std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(move || {
                let (element, _) = decode(&frame, 1 << 20).unwrap().unwrap();
                Message::decode(element).map(|_| ())
            })
            .unwrap()
            .join()
            .unwrap();
        assert!(matches!(result, Err(ProtocolError::Malformed("filter nesting"))));
    }

    #[test]
    fn write_operations_map_to_their_responses() {
        let delete = encode(DEL_REQUEST, b"uid=bob,dc=spring,dc=org");
        let decoded = Message::decode(message(4, delete)).unwrap();
        assert!(matches!(
            decoded.request,
            Request::Rejected { response_tag: DEL_RESPONSE, .. }
        ));
    }

    #[test]
    fn result_encoding() {
        let encoded = encode_result(5, BIND_RESPONSE, &LdapResult::success());
        assert_eq!(
            encoded,
            vec![0x30, 0x0c, 0x02, 0x01, 0x05, 0x61, 0x07, 0x0a, 0x01, 0x00, 0x04, 0x00, 0x04, 0x00]
        );
    }
}
