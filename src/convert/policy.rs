use crate::guess::IntegerGuess;

/// How a Rust struct with named fields is represented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StructConversionStyle {
    /// A D-Bus struct of the field values, in declaration order.
    StronglyTyped,
    /// An `a{sv}` dict from field name to field value. `None` fields are
    /// left out.
    Dict,
}

/// Decisions the serde bridge leaves to the caller.
pub trait ConversionPolicy: Clone {
    fn query_struct_name(&self, name: &str) -> StructConversionStyle;

    /// How 64-bit integers are typed.
    fn integer_guess(&self) -> IntegerGuess {
        IntegerGuess::Preserve
    }
}

#[derive(Clone, Debug, Default)]
pub struct DefaultConversionPolicy;

impl ConversionPolicy for DefaultConversionPolicy {
    fn query_struct_name(&self, _: &str) -> StructConversionStyle {
        StructConversionStyle::Dict
    }
}

#[derive(Clone, Debug, Default)]
pub struct StronglyTypedConversionPolicy;

impl ConversionPolicy for StronglyTypedConversionPolicy {
    fn query_struct_name(&self, _: &str) -> StructConversionStyle {
        StructConversionStyle::StronglyTyped
    }
}

/// Named structs as dicts, and 64-bit integers narrowed to int32 whenever
/// they fit, for peers that expect `i` where Rust code naturally holds an
/// `i64`.
#[derive(Clone, Debug, Default)]
pub struct LooseIntegerPolicy;

impl ConversionPolicy for LooseIntegerPolicy {
    fn query_struct_name(&self, _: &str) -> StructConversionStyle {
        StructConversionStyle::Dict
    }

    fn integer_guess(&self) -> IntegerGuess {
        IntegerGuess::INT32_FIRST
    }
}
