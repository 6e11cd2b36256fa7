//! Device-local key/value state for
//! anonymous viewers.
pub trait LocalState: Send + Sync {
  fn read(
    &self,
    key: &str
  ) -> Option<String>;

  fn write(
    &self,
    key: &str,
    value: &str
  );

  fn remove(&self, key: &str);
}
