//! # Tablecode Derive Macros
//!
//! This crate provides the procedural macros for `tablecode`. It automates the
//! implementation of `Record` (the record type descriptor plus value conversions) and
//! `FieldValue` (so the struct can be nested inside other records).
//!
//! Compatible with `syn 2.0`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, parse_macro_input};

/// Derives `Record` and `FieldValue` for a struct with named fields.
///
/// Struct attributes: `#[tablecode(name = "..")]` sets the record name used in schemas and
/// error paths, `#[tablecode(key = "..")]` sets the type key schemas are cached under.
/// Field attributes: `#[tablecode(rename = "..")]` sets the column name.
#[proc_macro_derive(TableRecord, attributes(tablecode))]
pub fn derive_table_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

// --- Internal Data Structures ---
struct RecordField {
    ident: syn::Ident,
    ty: syn::Type,
    column: String,
}

#[derive(Default)]
struct StructAttrs {
    name: Option<String>,
    key: Option<String>,
}

fn expand(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "TableRecord does not support generic structs",
        ));
    }

    let data_struct = match &input.data {
        Data::Struct(ds) => ds,
        _ => {
            return Err(syn::Error::new(
                name.span(),
                "TableRecord only supports structs",
            ));
        }
    };
    let named = match &data_struct.fields {
        Fields::Named(named) => named,
        _ => {
            return Err(syn::Error::new(
                name.span(),
                "TableRecord only supports structs with named fields",
            ));
        }
    };

    let attrs = parse_struct_attributes(&input.attrs)?;
    let mut fields = Vec::with_capacity(named.named.len());
    for field in &named.named {
        let Some(ident) = field.ident.clone() else {
            return Err(syn::Error::new_spanned(field, "expected a named field"));
        };
        let column = parse_field_attributes(&field.attrs)?
            .unwrap_or_else(|| ident.to_string().trim_start_matches("r#").to_string());
        fields.push(RecordField {
            ident,
            ty: field.ty.clone(),
            column,
        });
    }

    let impl_record = generate_record(name, &attrs, &fields);
    let impl_field_value = generate_field_value(name);

    Ok(quote! {
        #impl_record
        #impl_field_value
    })
}

/// Parses `#[tablecode(name = "..", key = "..")]` on the struct.
fn parse_struct_attributes(attrs: &[Attribute]) -> syn::Result<StructAttrs> {
    let mut parsed = StructAttrs::default();
    for attr in attrs {
        if attr.path().is_ident("tablecode") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    let s: LitStr = meta.value()?.parse()?;
                    parsed.name = Some(s.value());
                    return Ok(());
                }
                if meta.path.is_ident("key") {
                    let s: LitStr = meta.value()?.parse()?;
                    parsed.key = Some(s.value());
                    return Ok(());
                }
                Err(meta.error("Unknown tablecode struct attribute. Supported: name, key"))
            })?;
        }
    }
    Ok(parsed)
}

/// Parses `#[tablecode(rename = "..")]` on a field. Returns the column name override.
fn parse_field_attributes(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut rename = None;
    for attr in attrs {
        if attr.path().is_ident("tablecode") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let s: LitStr = meta.value()?.parse()?;
                    rename = Some(s.value());
                    return Ok(());
                }
                Err(meta.error("Unknown tablecode field attribute. Supported: rename"))
            })?;
        }
    }
    Ok(rename)
}

// --- Generator: Record ---

fn generate_record(
    name: &syn::Ident,
    attrs: &StructAttrs,
    fields: &[RecordField],
) -> proc_macro2::TokenStream {
    let record_name = attrs.name.clone().unwrap_or_else(|| name.to_string());
    let key_expr = match &attrs.key {
        Some(key) => quote! { #key },
        None => quote! { concat!(module_path!(), "::", stringify!(#name)) },
    };
    let field_count = fields.len();

    let declare_fields = fields.iter().map(|f| {
        let column = &f.column;
        let ty = &f.ty;
        quote! {
            .field(#column, <#ty as tablecode::record::FieldValue>::declared_type())
        }
    });

    let push_fields = fields.iter().map(|f| {
        let column = &f.column;
        let ident = &f.ident;
        quote! {
            record.push(#column, tablecode::record::FieldValue::to_value(&self.#ident));
        }
    });

    let take_fields = fields.iter().enumerate().map(|(index, f)| {
        let column = &f.column;
        let ident = &f.ident;
        let ty = &f.ty;
        quote! {
            #ident: reader.take::<#ty>(#index, #column)?
        }
    });

    quote! {
        impl tablecode::record::Record for #name {
            fn type_key() -> tablecode::types::TypeKey {
                tablecode::types::TypeKey::new(#key_expr)
            }

            fn record_type() -> tablecode::types::RecordType {
                tablecode::types::RecordType::builder_with_key(
                    <Self as tablecode::record::Record>::type_key(),
                    #record_name,
                )
                #(#declare_fields)*
                .build()
            }

            fn to_record(&self) -> tablecode::value::RecordValue {
                let mut record = tablecode::value::RecordValue::with_capacity(#field_count);
                #(#push_fields)*
                record
            }

            fn from_record(
                record: tablecode::value::RecordValue,
                path: &tablecode::types::FieldPath,
            ) -> tablecode::Result<Self> {
                #[allow(unused_mut, unused_variables)]
                let mut reader = tablecode::rt::FieldReader::new(record, path);
                Ok(Self { #(#take_fields),* })
            }
        }
    }
}

// --- Generator: FieldValue ---

fn generate_field_value(name: &syn::Ident) -> proc_macro2::TokenStream {
    quote! {
        impl tablecode::record::FieldValue for #name {
            fn declared_type() -> tablecode::types::DeclaredType {
                tablecode::rt::record_declared_type::<Self>()
            }

            fn to_value(&self) -> tablecode::value::Value {
                tablecode::value::Value::Record(tablecode::record::Record::to_record(self))
            }

            fn from_value(
                value: tablecode::value::Value,
                path: &tablecode::types::FieldPath,
            ) -> tablecode::Result<Self> {
                tablecode::rt::record_from_value::<Self>(value, path)
            }
        }
    }
}
