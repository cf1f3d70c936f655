mod chat_record;

pub use chat_record::ChatRecord;
