use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, spanned::Spanned, FnArg, GenericArgument, Ident, ItemFn, Pat, PathArguments,
    Signature, Type,
};

/// Transform an asynchronous test into a synchronous one, inject dependencies,
/// and ensure that the database is dropped regardless of how the test terminates.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// [`mongodb::Database`], [`crate::ballot_box::BallotBox`] and
/// [`crate::model::mongodb::Coll<T>`]. All of them share one freshly created
/// database.
///
/// The test is skipped, with a message on stderr, when `ROCKET_DB_URI` is not set.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract type information and reject invalid function signatures.
    let (test_args, collection_idents, collection_types) = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Log in the client as admin if needed.
    let maybe_login = match parse_macro_input!(args as Option<Ident>) {
        Some(arg) if arg == "admin" => quote! {
            ballot_box
                .ensure_admin_exists(crate::model::api::admin::AdminCredentials::example1())
                .await
                .unwrap();
            crate::testing::login_admin(&rocket_client).await;
        },
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected no argument or `admin`")
                .into_compile_error()
                .into();
        }
        None => quote! {},
    };

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn setup(
                db_uri: String,
            ) -> (
                rocket::local::asynchronous::Client,
                mongodb::Database,
                crate::ballot_box::BallotBox,
            ) {
                let (ballot_box, db) = crate::testing::mongo_ballot_box(&db_uri).await;
                let rocket_client = crate::testing::client_for(ballot_box.clone()).await;

                #maybe_login

                (rocket_client, db, ballot_box)
            }

            /// The test itself.
            #item_fn

            /// Test cleanup.
            async fn cleanup(db: mongodb::Database) {
                db.drop(None).await.unwrap();
            }

            let db_uri = match crate::testing::db_uri() {
                Some(uri) => uri,
                None => {
                    eprintln!("skipping {}: ROCKET_DB_URI is not set", stringify!(#name));
                    return;
                }
            };

            // Create an async runtime. We need a separate one for inside and
            // outside the `catch_unwind`.
            let outer_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("test-setup-cleanup")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            let inner_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            // Run the setup.
            let (rocket_client, db, ballot_box) = outer_runtime.block_on(setup(db_uri));

            // Run the test, catching any panics.
            // Use mutexes to safely transfer `!UnwindSafe` data.
            let client_mutex = std::sync::Mutex::new(rocket_client);
            let db_mutex = std::sync::Mutex::new(db.clone());
            let ballot_box_mutex = std::sync::Mutex::new(ballot_box);
            let runtime_mutex = std::sync::Mutex::new(inner_runtime);
            let result = std::panic::catch_unwind(|| {
                #[allow(unused_variables)]
                let rocket_client = client_mutex.into_inner().unwrap();
                #[allow(unused_variables)]
                let db = db_mutex.into_inner().unwrap();
                #[allow(unused_variables)]
                let ballot_box = ballot_box_mutex.into_inner().unwrap();
                let runtime = runtime_mutex.into_inner().unwrap();

                #(
                    let #collection_idents = crate::model::mongodb::Coll::<#collection_types>::from_db(&db);
                )*

                runtime.block_on(#new_name(#(#test_args),*));
            });

            // Run the cleanup.
            outer_runtime.block_on(cleanup(db));

            // If the test panicked, re-raise the panic.
            if let Err(cause) = result {
                std::panic::panic_any(cause);
            }
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject in signature
/// order, and reject unknown parameters.
#[allow(clippy::type_complexity)]
fn check_sig(sig: Signature) -> Result<(Vec<TokenStream2>, Vec<Ident>, Vec<Ident>), syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_client = false;
    let mut has_db = false;
    let mut has_ballot_box = false;
    let mut args = vec![];
    let mut collection_idents = vec![];
    let mut collection_types = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let Pat::Ident(pat_ident) = &*pat_type.pat {
                if let Type::Path(type_path) = &*pat_type.ty {
                    if let Some(type_ident) = type_path.path.get_ident() {
                        let (seen, injected, full_name) = if type_ident == "Client" {
                            (
                                &mut has_client,
                                quote! { rocket_client },
                                "rocket::local::asynchronous::Client",
                            )
                        } else if type_ident == "Database" {
                            (&mut has_db, quote! { db.clone() }, "mongodb::Database")
                        } else if type_ident == "BallotBox" {
                            (
                                &mut has_ballot_box,
                                quote! { ballot_box },
                                "crate::ballot_box::BallotBox",
                            )
                        } else {
                            return Err(unexpected(input));
                        };
                        if *seen {
                            return Err(syn::Error::new(
                                input.span(),
                                format!("Test cannot accept more than one `{full_name}`"),
                            ));
                        }
                        *seen = true;
                        args.push(injected);
                        continue;
                    }

                    // Valid as the last path segment for any type is itself
                    let possible_collection = type_path.path.segments.last().unwrap();
                    if possible_collection.ident == "Coll" {
                        if let PathArguments::AngleBracketed(generics) =
                            &possible_collection.arguments
                        {
                            if let Some(GenericArgument::Type(Type::Path(type_path))) =
                                generics.args.first()
                            {
                                if let Some(type_ident) = type_path.path.get_ident() {
                                    let ident = pat_ident.ident.clone();
                                    args.push(quote! { #ident });
                                    collection_idents.push(ident);
                                    collection_types.push(type_ident.clone());
                                    continue;
                                }
                            }
                        }
                    }
                }
            }
        }

        return Err(unexpected(input));
    }

    Ok((args, collection_idents, collection_types))
}

fn unexpected(input: &FnArg) -> syn::Error {
    syn::Error::new(
        input.span(),
        "Expected one of `client_ident: Client`, `db_ident: Database`, `ballot_box_ident: BallotBox` or `collection_ident: Coll<T>`",
    )
}
