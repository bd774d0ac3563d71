use std::collections::BTreeSet;

use proc_macro2 as pm2;

use crate::attributes::{ContainerMeta, FieldMeta, FilterKind};

/// `BlogPost` becomes `blog_post`.
fn snake_case(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 4);
    let mut prev_lower = false;
    for c in ident.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

pub fn derive_filterable(input: syn::DeriveInput) -> pm2::TokenStream {
    let syn::DeriveInput {
        ident,
        data,
        generics,
        attrs,
        ..
    } = input;

    let mut container = ContainerMeta::default();
    for attr in attrs.iter() {
        if attr.path.is_ident("filter") {
            let parsed = match attr.parse_args::<ContainerMeta>() {
                Ok(parsed) => parsed,
                Err(e) => return syn::Error::into_compile_error(e),
            };
            if parsed.table.is_some() {
                container.table = parsed.table;
            }
            if parsed.model.is_some() {
                container.model = parsed.model;
            }
            if parsed.operators.is_some() {
                container.operators = parsed.operators;
            }
            container.restrictions.extend(parsed.restrictions);
        }
    }

    let named = match data {
        syn::Data::Struct(syn::DataStruct {
            fields: syn::Fields::Named(syn::FieldsNamed { named, .. }),
            ..
        }) => named,
        _ => {
            return syn::Error::new(
                ident.span(),
                "Filterable can only be derived for structs with named fields.",
            )
            .to_compile_error();
        }
    };

    let mut body = pm2::TokenStream::new();
    let mut exposed = BTreeSet::new();

    for field in named.iter() {
        let fieldid = match field.ident.as_ref() {
            Some(id) => id,
            None => continue,
        };
        let column = syn::LitStr::new(&fieldid.to_string(), fieldid.span());

        let mut meta = FieldMeta::default();
        for attr in field.attrs.iter() {
            if attr.path.is_ident("filter") {
                match attr.parse_args::<FieldMeta>() {
                    Ok(parsed) => meta.merge(parsed),
                    Err(e) => return syn::Error::into_compile_error(e),
                }
            }
        }

        let name = meta.name.unwrap_or_else(|| column.clone());
        let renamed = name.value() != column.value();
        let fieldtype = &field.ty;

        match meta.kind {
            FilterKind::Excluded => continue,
            FilterKind::Relation => {
                body.extend(if renamed {
                    quote::quote! {
                        .renamed_relation::<#fieldtype>(#name, #column)
                    }
                } else {
                    quote::quote! {
                        .relation::<#fieldtype>(#name)
                    }
                });
            }
            FilterKind::Field { operators } => {
                body.extend(if renamed {
                    quote::quote! { .renamed_field(#name, #column) }
                } else {
                    quote::quote! { .field(#name) }
                });
                if !operators.is_empty() {
                    body.extend(quote::quote! {
                        .restrict(#name, [#(#operators),*])
                    });
                }
            }
        }
        exposed.insert(name.value());
    }

    for restrict in container.restrictions.iter() {
        if !exposed.contains(&restrict.field) {
            return syn::Error::new(
                restrict.span,
                format!("'{}' is not an exposed field of {}", restrict.field, ident),
            )
            .to_compile_error();
        }
        let field = &restrict.field;
        let operators = &restrict.operators;
        body.extend(quote::quote! {
            .restrict(#field, [#(#operators),*])
        });
    }

    if let Some(operators) = container.operators {
        body.extend(quote::quote! {
            .operators([#(#operators),*])
        });
    }

    let model = container
        .model
        .unwrap_or_else(|| syn::LitStr::new(&ident.to_string(), ident.span()));
    let table = container
        .table
        .unwrap_or_else(|| syn::LitStr::new(&snake_case(&ident.to_string()), ident.span()));

    let (generics, ty_generics, wc) = generics.split_for_impl();

    quote::quote! {
        const _: () = {
            #[automatically_derived]
            impl #generics ::filter_query::Filterable for #ident #ty_generics #wc {
                fn policy() -> ::filter_query::ModelPolicy {
                    ::filter_query::ModelPolicy::builder(#model, #table)
                        #body
                        .build()
                }
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::snake_case;

    #[test]
    fn snake() {
        assert_eq!(snake_case("Post"), "post");
        assert_eq!(snake_case("BlogPost"), "blog_post");
        assert_eq!(snake_case("HTTPLog"), "httplog");
        assert_eq!(snake_case("Post2Tag"), "post2_tag");
    }
}
