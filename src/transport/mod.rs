// Transport layer
// JSON-RPC node access for signing and HTTP access to the routing oracle
//
// Numan Thabit 2025 Nov

pub mod jsonrpc;
pub mod lifi;
