//! Derive macros for the Meridian canonical serialization traits.
//!
//! `MrdSerialize` and `MrdDeserialize` generate field-by-field
//! `MeridianSerialize`/`MeridianDeserialize` impls for structs whose fields
//! all implement the traits themselves. Enums are not supported: wire enums
//! carry discriminants that are a protocol detail, so their impls are
//! written by hand next to the type.

extern crate proc_macro;
use proc_macro::TokenStream;

mod deserialize;
mod serialize;

#[proc_macro_derive(MrdSerialize)]
pub fn serializable(input: TokenStream) -> TokenStream {
    let ast = syn::parse(input).unwrap();
    serialize::impl_ser_macro(&ast)
}

#[proc_macro_derive(MrdDeserialize)]
pub fn deserializable(input: TokenStream) -> TokenStream {
    let ast = syn::parse(input).unwrap();
    deserialize::impl_deser_macro(&ast)
}
