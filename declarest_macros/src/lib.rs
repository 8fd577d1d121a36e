//! `#[derive(Bind)]` for declarest request inputs.
//!
//! Each field may carry one `#[bind(...)]` attribute naming where its value
//! comes from:
//!
//! ```rust,ignore
//! #[derive(Default, Bind)]
//! struct GetPet {
//!     #[bind(path = "id", required)]
//!     id: u64,
//!     #[bind(query)]
//!     fields: Vec<String>,
//!     #[bind(header = "X-Tenant")]
//!     tenant: Option<String>,
//!     #[bind(body)]
//!     patch: Option<PetPatch>,
//!     #[bind(flatten)]
//!     paging: Paging,
//! }
//! ```
//!
//! The derive compiles the attributes into a `static` field plan, so the
//! request path replays the plan instead of inspecting the type again.
//! Conflicting declarations are rejected here, at compile time.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{quote, ToTokens};
use syn::{
    parse_macro_input, spanned::Spanned, Data, DeriveInput, Field, Fields, GenericArgument,
    LitStr, PathArguments, Type,
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Path,
    Query,
    Header,
    Cookie,
    Body,
}

impl SourceKind {
    fn from_ident(name: &str) -> Option<Self> {
        match name {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            "body" => Some(Self::Body),
            _ => None,
        }
    }

    fn tokens(self) -> TokenStream2 {
        match self {
            Self::Path => quote!(::declarest::binder::Source::Path),
            Self::Query => quote!(::declarest::binder::Source::Query),
            Self::Header => quote!(::declarest::binder::Source::Header),
            Self::Cookie => quote!(::declarest::binder::Source::Cookie),
            Self::Body => quote!(::declarest::binder::Source::Body),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Recurse {
    Flatten,
    Nested,
}

#[derive(Default)]
struct FieldAttrs {
    source: Option<(SourceKind, Option<LitStr>)>,
    recurse: Option<Recurse>,
    required: bool,
}

#[derive(Clone, Copy)]
enum Shape {
    Scalar,
    Optional,
    List,
    OptionalList,
}

/// Returns the single generic argument of `ty` when its last path segment is `wrapper`.
fn unwrap_generic<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(p) = ty else {
        return None;
    };
    if p.qself.is_some() {
        return None;
    }
    let seg = p.path.segments.last()?;
    if seg.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &seg.arguments else {
        return None;
    };
    if args.args.len() != 1 {
        return None;
    }
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

fn shape_of(ty: &Type) -> Shape {
    if let Some(inner) = unwrap_generic(ty, "Option") {
        if unwrap_generic(inner, "Vec").is_some() {
            return Shape::OptionalList;
        }
        return Shape::Optional;
    }
    if unwrap_generic(ty, "Vec").is_some() {
        return Shape::List;
    }
    Shape::Scalar
}

fn parse_field_attrs(field: &Field) -> syn::Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("bind")) {
        attr.parse_nested_meta(|meta| {
            let ident = meta
                .path
                .get_ident()
                .map(|i| i.to_string())
                .unwrap_or_default();

            if ident == "required" {
                attrs.required = true;
                return Ok(());
            }
            if ident == "flatten" || ident == "nested" {
                if attrs.recurse.is_some() || attrs.source.is_some() {
                    return Err(meta.error("a field may declare only one binding"));
                }
                attrs.recurse = Some(if ident == "flatten" {
                    Recurse::Flatten
                } else {
                    Recurse::Nested
                });
                return Ok(());
            }
            let Some(kind) = SourceKind::from_ident(&ident) else {
                return Err(meta.error(
                    "expected one of: path, query, header, cookie, body, flatten, nested, required",
                ));
            };
            if attrs.source.is_some() || attrs.recurse.is_some() {
                return Err(meta.error("a field may declare only one binding source"));
            }
            let name = if meta.input.peek(syn::Token![=]) {
                let lit: LitStr = meta.value()?.parse()?;
                if kind == SourceKind::Body {
                    return Err(syn::Error::new(lit.span(), "`body` does not take a name"));
                }
                if lit.value().is_empty() {
                    return Err(syn::Error::new(lit.span(), "binding name must not be empty"));
                }
                Some(lit)
            } else {
                None
            };
            attrs.source = Some((kind, name));
            Ok(())
        })?;
    }

    if attrs.required && attrs.source.is_none() {
        return Err(syn::Error::new(
            field.span(),
            "`required` needs a binding source (path, query, header, cookie or body)",
        ));
    }
    Ok(attrs)
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(
            input.span(),
            "Bind can only be derived for structs with named fields",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new(
            input.span(),
            "Bind can only be derived for structs with named fields",
        ));
    };

    let mut specs = Vec::new();
    let mut steps = Vec::new();

    for field in &fields.named {
        let attrs = parse_field_attrs(field)?;
        let Some(field_ident) = field.ident.as_ref() else {
            continue;
        };
        let field_name = field_ident.to_string();
        let field_name = field_name.trim_start_matches("r#").to_string();
        let ty = &field.ty;
        let type_name = ty.to_token_stream().to_string().replace(' ', "");
        let idx = specs.len();

        if let Some(recurse) = attrs.recurse {
            let (shape, call) = match recurse {
                Recurse::Flatten => (
                    quote!(::declarest::binder::Shape::Flatten),
                    quote!(cursor.flatten(&plan[#idx], &mut self.#field_ident)?;),
                ),
                Recurse::Nested => (
                    quote!(::declarest::binder::Shape::Nested),
                    quote!(cursor.nested(&plan[#idx], &mut self.#field_ident)?;),
                ),
            };
            specs.push(quote! {
                ::declarest::binder::FieldSpec {
                    field: #field_name,
                    key: #field_name,
                    source: ::core::option::Option::None,
                    required: false,
                    shape: #shape,
                    type_name: #type_name,
                }
            });
            steps.push(call);
            continue;
        }

        let Some((kind, name)) = attrs.source else {
            continue;
        };
        let key = match (&name, kind) {
            (_, SourceKind::Body) => String::new(),
            (Some(lit), _) => lit.value(),
            (None, _) => field_name.clone(),
        };
        let required = attrs.required;
        let source = kind.tokens();
        let shape = if kind == SourceKind::Body {
            match shape_of(ty) {
                Shape::Optional | Shape::OptionalList => Shape::Optional,
                _ => Shape::Scalar,
            }
        } else {
            shape_of(ty)
        };
        let (shape_tokens, call) = match (kind, shape) {
            (SourceKind::Body, Shape::Optional) => (
                quote!(::declarest::binder::Shape::Optional),
                quote!(cursor.optional_body(&plan[#idx], &mut self.#field_ident)?;),
            ),
            (SourceKind::Body, _) => (
                quote!(::declarest::binder::Shape::Scalar),
                quote!(cursor.body(&plan[#idx], &mut self.#field_ident)?;),
            ),
            (_, Shape::Scalar) => (
                quote!(::declarest::binder::Shape::Scalar),
                quote!(cursor.scalar(&plan[#idx], &mut self.#field_ident);),
            ),
            (_, Shape::Optional) => (
                quote!(::declarest::binder::Shape::Optional),
                quote!(cursor.optional(&plan[#idx], &mut self.#field_ident);),
            ),
            (_, Shape::List) => (
                quote!(::declarest::binder::Shape::List),
                quote!(cursor.list(&plan[#idx], &mut self.#field_ident);),
            ),
            (_, Shape::OptionalList) => (
                quote!(::declarest::binder::Shape::OptionalList),
                quote!(cursor.optional_list(&plan[#idx], &mut self.#field_ident);),
            ),
        };
        specs.push(quote! {
            ::declarest::binder::FieldSpec {
                field: #field_name,
                key: #key,
                source: ::core::option::Option::Some(#source),
                required: #required,
                shape: #shape_tokens,
                type_name: #type_name,
            }
        });
        steps.push(call);
    }

    let count = specs.len();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::declarest::binder::Bindable for #ident #ty_generics #where_clause {
            fn field_plan(&self) -> &'static [::declarest::binder::FieldSpec] {
                static PLAN: [::declarest::binder::FieldSpec; #count] = [#(#specs),*];
                &PLAN
            }

            #[allow(unused_variables)]
            fn bind_fields(
                &mut self,
                cursor: &mut ::declarest::binder::BindCursor<'_>,
            ) -> ::declarest::anyhow::Result<()> {
                let plan = ::declarest::binder::Bindable::field_plan(self);
                #(#steps)*
                ::core::result::Result::Ok(())
            }
        }
    })
}

/// Derives `declarest::binder::Bindable` from `#[bind(...)]` field attributes.
#[proc_macro_derive(Bind, attributes(bind))]
pub fn derive_bind(item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
