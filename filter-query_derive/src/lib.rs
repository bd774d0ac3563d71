use proc_macro::{self, TokenStream};

use proc_macro2 as pm2;

mod attributes;
mod filtering;

/// Derive the `Filterable` trait, publishing a `ModelPolicy` for the
/// type.
///
/// This is only implemented for structs with named fields. All fields
/// are exposed as filterable columns, under their own names and with
/// every registered operator, unless annotated otherwise. The
/// annotations use the `filter` attribute.
///
/// On the struct:
///
/// - `#[filter(table = "posts")]` The table used to qualify columns.
///   Defaults to the type name in snake case.
///
/// - `#[filter(model = "Post")]` The model name used in error
///   messages. Defaults to the type name.
///
/// - `#[filter(restrict = "id:$eq,$in")]` Restrict the exposed field
///   `id` to the operators `$eq` and `$in`. May be repeated. The field
///   must be exposed, which is checked at compile time.
///
/// - `#[filter(operators("$eq", "$in", "$or"))]` Accept only these
///   operators anywhere on this model, out of those registered.
///
/// On fields:
///
/// - `#[filter(rename = "new_name")]` Expose the member as `new_name`
///   instead of its name in the source code. The member's own name
///   is still the column or relation handed to the query.
///
/// - `#[filter(op("$eq", "$like"))]` Restrict the field to these
///   operators.
///
/// - `#[filter(relation)]` The type of this field is itself
///   `Filterable` (possibly inside a `Vec`, `Option`, `Box` or `Arc`),
///   and filters may follow it into the related model.
///
/// - `#[filter(exclude)]` Do not expose this field at all.
#[proc_macro_derive(Filterable, attributes(filter))]
pub fn filterable(input: TokenStream) -> TokenStream {
    let derive: syn::DeriveInput = syn::parse_macro_input!(input);

    let res: pm2::TokenStream = filtering::derive_filterable(derive);

    res.into()
}
