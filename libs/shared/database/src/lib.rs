pub mod docstore;

pub use docstore::DocStoreClient;
