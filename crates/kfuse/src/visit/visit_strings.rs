use super::VisitMut;
use crate::value::Value;

/// Recursively visit all string nodes mutably
///
/// Object keys are not visited.
pub trait VisitStringsMut {
    fn visit_strings_mut(&mut self, visitor: &mut dyn VisitMut<String>);
}

impl VisitStringsMut for Value {
    fn visit_strings_mut(&mut self, visitor: &mut dyn VisitMut<String>) {
        match self {
            Value::String(string) => visitor.visit_mut(string),
            Value::Array(items) => {
                for item in items {
                    item.visit_strings_mut(visitor);
                }
            }
            Value::Object(object) => {
                for value in object.values_mut() {
                    value.visit_strings_mut(visitor);
                }
            }
            Value::Null | Value::Boolean(_) | Value::Integer(_) | Value::Decimal(_) => {}
        }
    }
}
