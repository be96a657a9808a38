/// Backend access.
///
/// `api` owns the wire format (URLs, request bodies, response validation)
/// and is pure; `client` does the blocking HTTP. Payload examples used by
/// the tests live in `fixtures`.

pub mod api;
pub mod client;

#[cfg(test)]
pub(crate) mod fixtures;
