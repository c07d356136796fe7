// Error codes implementation
// Stable, machine-readable codes attached to every engine error

pub mod schema {
    pub const PARSE_FAILED: &str = "SCHEMA_1001";
    pub const UNKNOWN_REFERENCE: &str = "SCHEMA_1002";
    pub const DUPLICATE_DEFINITION: &str = "SCHEMA_1003";
    pub const INVALID_HIERARCHY: &str = "SCHEMA_1004";
    pub const UNGROUNDED_CYCLE: &str = "SCHEMA_1005";
    pub const INVALID_CONDITION: &str = "SCHEMA_1006";
}

pub mod request {
    pub const UNKNOWN_OBJECT_TYPE: &str = "REQUEST_2001";
    pub const UNKNOWN_RELATION: &str = "REQUEST_2002";
    pub const INVALID_TUPLE: &str = "REQUEST_2003";
    pub const INVALID_REQUEST: &str = "REQUEST_2004";
    pub const INVALID_PERMISSION_ENTRY: &str = "REQUEST_2005";
}

pub mod authorization {
    pub const ACCESS_DENIED: &str = "AUTHZ_3001";
}

pub mod condition {
    pub const NOT_FOUND: &str = "CONDITION_4001";
    pub const PARAMETER: &str = "CONDITION_4002";
    pub const EVALUATION: &str = "CONDITION_4003";
}

pub mod store {
    pub const READ_FAILED: &str = "STORE_5001";
    pub const TIMEOUT: &str = "STORE_5002";
    pub const INTERNAL: &str = "STORE_5003";
}
