pub mod http_validate;
