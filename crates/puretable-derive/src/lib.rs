//! Derive macro mapping a native struct onto a puretable record schema.
//!
//! Provides `#[derive(Record)]`, which describes every field with its real
//! in-memory offset (`offset_of!`) and size, so the schema follows whatever
//! padding the compiler chose while the disk record stays tightly packed.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr};

/// Derive `puretable::Record` for a struct with named fields.
///
/// Fields are stored in declaration order. Every field type must implement
/// `puretable::NativeField` (the fixed-width integers, `f32`, `f64` and
/// `[u8; N]` fixed strings), and the struct must be `Copy`.
///
/// The on-disk field name defaults to the Rust field name and can be
/// changed with `#[record(rename = "...")]`.
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match impl_record(&input) {
        Ok(ts) => ts.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn impl_record(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Record cannot be derived for generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Record can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Record can only be derived for structs",
            ));
        }
    };
    if fields.is_empty() {
        return Err(syn::Error::new_spanned(
            name,
            "Record needs at least one field",
        ));
    }

    let mut describe_stmts = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let ty = &field.ty;
        let disk_name = disk_name(field)?.unwrap_or_else(|| ident.to_string());

        describe_stmts.push(quote! {
            builder.describe_field(
                #disk_name,
                <#ty as ::puretable::NativeField>::FIELD_TYPE,
                ::core::mem::offset_of!(#name, #ident),
                ::core::mem::size_of::<#ty>(),
            )?;
        });
    }

    Ok(quote! {
        // SAFETY: every described range is exactly one field, and every field
        // is a `NativeField`, valid for any bit pattern.
        unsafe impl ::puretable::Record for #name {
            fn schema() -> ::puretable::Result<::puretable::Schema> {
                let mut builder = ::puretable::SchemaBuilder::new();
                #(#describe_stmts)*
                builder.finalize(::core::mem::size_of::<Self>())
            }
        }
    })
}

/// Value of `#[record(rename = "...")]` on a field, if present.
fn disk_name(field: &syn::Field) -> syn::Result<Option<String>> {
    let mut rename = None;
    for attr in &field.attrs {
        if !attr.path().is_ident("record") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let lit: LitStr = meta.value()?.parse()?;
                if lit.value().is_empty() {
                    return Err(syn::Error::new_spanned(&lit, "field name must not be empty"));
                }
                rename = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error("unsupported record attribute, expected `rename`"))
            }
        })?;
    }
    Ok(rename)
}
