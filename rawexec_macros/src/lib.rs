use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, Index};

fn has_stable_repr(attrs: &[Attribute]) -> syn::Result<bool> {
    let mut stable = false;
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("repr")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("C") || meta.path.is_ident("transparent") {
                stable = true;
            }
            // align(N), packed(N)
            if meta.input.peek(syn::token::Paren) {
                let content;
                syn::parenthesized!(content in meta.input);
                content.parse::<TokenStream2>()?;
            }
            Ok(())
        })?;
    }
    Ok(stable)
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "ArgumentBlock cannot be derived for generic types",
        ));
    }

    if !has_stable_repr(&input.attrs)? {
        return Err(syn::Error::new_spanned(
            name,
            "ArgumentBlock requires #[repr(C)] or #[repr(transparent)]",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => &data.fields,
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "ArgumentBlock can only be derived for structs",
            ))
        }
    };

    let entries: Vec<TokenStream2> = match fields {
        Fields::Named(named) => named
            .named
            .iter()
            .filter_map(|field| field.ident.as_ref())
            .map(|ident| {
                let label = ident.to_string();
                quote! { (#label, ::core::mem::offset_of!(#name, #ident)) }
            })
            .collect(),
        Fields::Unnamed(unnamed) => (0..unnamed.unnamed.len())
            .map(|i| {
                let label = i.to_string();
                let index = Index::from(i);
                quote! { (#label, ::core::mem::offset_of!(#name, #index)) }
            })
            .collect(),
        Fields::Unit => Vec::new(),
    };

    Ok(quote! {
        unsafe impl ::rawexec::ArgumentBlock for #name {
            const FIELDS: &'static [(&'static str, usize)] = &[#(#entries),*];
        }
    })
}

/// Implements `rawexec::ArgumentBlock` for a `#[repr(C)]` struct, recording
/// the byte offset of every field.
#[proc_macro_derive(ArgumentBlock)]
pub fn derive_argument_block(item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
