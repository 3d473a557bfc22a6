//! Attribute macros for async entry points and tests.
//!
//! `#[core_async::test]` and `#[core_async::main]` wrap an `async fn` in a
//! synchronous function that drives it on a tokio runtime built through
//! `core_async::runtime`, so callers never name tokio themselves.
//!
//! The only accepted argument is `flavor`:
//!
//! ```ignore
//! #[core_async::test(flavor = "multi_thread")]
//! async fn concurrent_writers() { /* ... */ }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::parse::Parser;
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, Expr, ExprLit, ItemFn, Lit, MetaNameValue, Token};

#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, MacroKind::Test)
}

#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, MacroKind::Main)
}

enum MacroKind {
    Test,
    Main,
}

enum Flavor {
    CurrentThread,
    MultiThread,
}

fn parse_flavor(attr: TokenStream) -> syn::Result<Flavor> {
    let args = Punctuated::<MetaNameValue, Token![,]>::parse_terminated.parse(attr)?;
    let mut flavor = Flavor::CurrentThread;

    for arg in args {
        if !arg.path.is_ident("flavor") {
            return Err(syn::Error::new_spanned(
                arg.path,
                "unknown argument, expected `flavor`",
            ));
        }
        let value = match &arg.value {
            Expr::Lit(ExprLit {
                lit: Lit::Str(s), ..
            }) => s.value(),
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "`flavor` must be a string literal",
                ))
            }
        };
        flavor = match value.as_str() {
            "current_thread" => Flavor::CurrentThread,
            "multi_thread" => Flavor::MultiThread,
            _ => {
                return Err(syn::Error::new_spanned(
                    arg.value,
                    "expected \"current_thread\" or \"multi_thread\"",
                ))
            }
        };
    }

    Ok(flavor)
}

fn expand(attr: TokenStream, item: TokenStream, kind: MacroKind) -> TokenStream {
    let flavor = match parse_flavor(attr) {
        Ok(flavor) => flavor,
        Err(err) => return err.to_compile_error().into(),
    };

    let input = parse_macro_input!(item as ItemFn);

    if input.sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            input.sig.fn_token,
            "core_async attribute macros require `async fn`",
        )
        .to_compile_error()
        .into();
    }

    let mut sig = input.sig;
    sig.asyncness = None;

    let attrs = input.attrs;
    let vis = input.vis;
    let block = input.block;

    let builder: TokenStream2 = match flavor {
        Flavor::CurrentThread => quote!(core_async::runtime::Builder::new_current_thread()),
        Flavor::MultiThread => quote!(core_async::runtime::Builder::new_multi_thread()),
    };

    let test_attr = match kind {
        MacroKind::Test => quote!(#[test]),
        MacroKind::Main => quote!(),
    };

    quote! {
        #(#attrs)*
        #test_attr
        #vis #sig {
            #builder
                .enable_all()
                .build()
                .expect("core_async: failed to build runtime")
                .block_on(async move #block)
        }
    }
    .into()
}
