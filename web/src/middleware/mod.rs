pub(crate) mod request_logger;
