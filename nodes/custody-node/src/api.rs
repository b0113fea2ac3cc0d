pub mod http;
pub mod rpc;

pub mod paths {
    pub const CREATE_KEY: &str = "/new/:algorithm";
    pub const DELETE_KEY: &str = "/delete";
    pub const SIGN: &str = "/sign";
    pub const KEY_INFO: &str = "/:id";
    pub const OPENAPI: &str = "/api-docs/openapi.json";
}
