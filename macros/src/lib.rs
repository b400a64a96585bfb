//! Proc macros for the cntryl-bench benchmark engine.
//!
//! This crate provides the `#[bench_test]` attribute macro for registering
//! payload functions that are discovered and measured by `bench_main!()`.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, Expr, ExprLit, ItemFn, Lit, Meta, Token};

/// Mark a function as a benchmark payload.
///
/// The function takes no arguments and is called many times per cycle. It
/// may return `()`, `ControlFlow<()>` (`Break` ends the cycle early) or a
/// `Result<(), E>` (an `Err` fails the benchmark).
///
/// # Example
///
/// ```rust,ignore
/// use cntryl_bench::bench_test;
///
/// #[bench_test]
/// fn sum_small() {
///     let mut acc = 0u64;
///     for i in 0..100 {
///         acc = acc.wrapping_add(i);
///     }
///     std::hint::black_box(acc);
/// }
/// ```
///
/// # Attributes
///
/// - `#[bench_test]` - Basic benchmark
/// - `#[bench_test(ignore)]` - Skip this benchmark unless explicitly requested
/// - `#[bench_test(name = "custom_name")]` - Use a custom name instead of function name
#[proc_macro_attribute]
pub fn bench_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let metas = parse_macro_input!(attr with Punctuated::<Meta, Token![,]>::parse_terminated);
    let input = parse_macro_input!(item as ItemFn);

    match expand(metas, input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(
    metas: Punctuated<Meta, Token![,]>,
    input: ItemFn,
) -> syn::Result<proc_macro2::TokenStream> {
    let sig = &input.sig;
    if !sig.inputs.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.inputs,
            "#[bench_test] functions take no arguments",
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "#[bench_test] functions cannot be generic",
        ));
    }
    if let Some(asyncness) = &sig.asyncness {
        return Err(syn::Error::new_spanned(
            asyncness,
            "#[bench_test] functions must be synchronous",
        ));
    }

    let fn_name = &sig.ident;
    let mut name = fn_name.to_string();
    let mut ignored = false;

    for meta in metas {
        match meta {
            Meta::Path(path) if path.is_ident("ignore") => ignored = true,
            Meta::NameValue(nv) if nv.path.is_ident("name") => match &nv.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(s), ..
                }) => name = s.value(),
                other => {
                    return Err(syn::Error::new_spanned(other, "expected a string literal"));
                }
            },
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "unknown attribute, expected `ignore` or `name = \"...\"`",
                ));
            }
        }
    }

    let upper = fn_name.to_string().to_uppercase();
    let submit_ident = format_ident!("__BENCH_ENTRY_{}", upper, span = fn_name.span());
    let payload_ident = format_ident!("__bench_payload_{}", fn_name, span = fn_name.span());

    Ok(quote! {
        #input

        #[doc(hidden)]
        fn #payload_ident() -> ::cntryl_bench::__private::Arc<dyn ::cntryl_bench::__private::Payload> {
            ::cntryl_bench::__private::Arc::new(::cntryl_bench::__private::FnPayload::new(#fn_name))
        }

        #[allow(non_upper_case_globals)]
        #[::cntryl_bench::__private::linkme::distributed_slice(::cntryl_bench::__private::BENCHMARKS)]
        #[linkme(crate = ::cntryl_bench::__private::linkme)]
        static #submit_ident: ::cntryl_bench::__private::BenchmarkEntry = ::cntryl_bench::__private::BenchmarkEntry {
            name: #name,
            payload: #payload_ident,
            ignored: #ignored,
            module_path: module_path!(),
        };
    })
}

/// Generate the main function for a bench binary.
///
/// Place this at the end of a `harness = false` bench target to create an
/// executable that discovers and runs all `#[bench_test]` payloads.
///
/// # Example
///
/// ```rust,ignore
/// use cntryl_bench::{bench_main, bench_test};
///
/// #[bench_test]
/// fn noop_call() {}
///
/// bench_main!();
/// ```
#[proc_macro]
pub fn bench_main(_input: TokenStream) -> TokenStream {
    let expanded = quote! {
        fn main() {
            ::cntryl_bench::bench_binary_main();
        }
    };
    TokenStream::from(expanded)
}
