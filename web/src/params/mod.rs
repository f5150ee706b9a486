pub(crate) mod event_stream;
