pub mod binder;
pub mod connection;
pub mod dispatcher;
pub mod session;
pub mod subscription;
pub mod view;

#[cfg(test)]
mod test_support;
