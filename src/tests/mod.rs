pub mod buffer_pool_test;
pub mod iterator_test;
